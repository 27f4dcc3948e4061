//! Tests for role permissions in `src/services/roles.rs`.

use remobot::domain::RoleType;
use remobot::services::roles::{
    get_permissions, has_permission, require_permission, Permission, ASSIGNABLE_ROLES,
};

#[test]
fn owner_can_do_owner_things() {
    let roles = [RoleType::Owner];
    assert!(has_permission(&roles, Permission::LaunchProject));
    assert!(has_permission(&roles, Permission::ApproveCheckpoint));
    assert!(has_permission(&roles, Permission::ConfirmBudget));
}

#[test]
fn viewer_is_read_only() {
    let roles = [RoleType::Viewer];
    assert!(has_permission(&roles, Permission::ViewStages));
    assert!(has_permission(&roles, Permission::ViewBudget));
    assert!(!has_permission(&roles, Permission::EditStage));
    assert!(!has_permission(&roles, Permission::EditBudget));
    assert!(!has_permission(&roles, Permission::InviteMember));
}

#[test]
fn multiple_roles_union_their_permissions() {
    // A tradesperson cannot edit budgets, a foreman can; holding both
    // roles grants the union.
    let tradesperson = [RoleType::Tradesperson];
    assert!(!has_permission(&tradesperson, Permission::EditBudget));

    let both = [RoleType::Tradesperson, RoleType::Foreman];
    assert!(has_permission(&both, Permission::EditBudget));
    assert!(has_permission(&both, Permission::SendStatus));

    let union = get_permissions(&both);
    for permission in get_permissions(&tradesperson) {
        assert!(union.contains(&permission));
    }
}

#[test]
fn owner_is_not_assignable() {
    assert!(!ASSIGNABLE_ROLES.contains(&RoleType::Owner));
    assert_eq!(ASSIGNABLE_ROLES.len(), 7);
}

#[test]
fn require_permission_denies_with_friendly_message() {
    let err = require_permission(&[RoleType::Supplier], Permission::LaunchProject)
        .expect_err("supplier cannot launch");
    assert!(err.user_message().contains("нет прав"));
}

#[test]
fn no_roles_means_no_permissions() {
    assert!(!has_permission(&[], Permission::ViewStages));
    assert!(get_permissions(&[]).is_empty());
}
