//! Conversation state store for multi-step flows.
//!
//! State is keyed by `(chat_id, user_id)` so concurrent conversations
//! never contend; within one conversation the platform delivers updates
//! in order. State lives in memory and expires on restart — an expired
//! flow simply answers "unrecognised command" and the user starts over.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::ai::ChatMessage;
use crate::domain::{BudgetCategory, RenovationType, RoleType};

/// Which stage attribute a stage-setup step is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageField {
    /// Start date (`DD.MM.YYYY` etc.).
    StartDate,
    /// End date.
    EndDate,
    /// Duration in days.
    Duration,
    /// Responsible contact text.
    Responsible,
    /// Stage budget amount.
    Budget,
    /// Newline-separated sub-stage names.
    SubStages,
}

/// Current step of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvState {
    // Project creation wizard.
    /// Waiting for the project name.
    ProjectName,
    /// Waiting for the address (or "-").
    ProjectAddress,
    /// Waiting for the area in m² (or "-").
    ProjectArea,
    /// Waiting for the renovation type (inline keyboard).
    ProjectType,
    /// Waiting for the total budget (or "-").
    ProjectBudget,
    /// Multi-select of custom furniture items (inline keyboard).
    ProjectCustomItems,
    /// Final confirmation.
    ProjectConfirm,

    /// Stage setup: waiting for one attribute of one stage.
    StageInput {
        /// The stage being configured.
        stage_id: i64,
        /// Which attribute is being collected.
        field: StageField,
    },

    /// Role management: waiting for the role pick (inline keyboard).
    InviteRole {
        /// Target project.
        project_id: i64,
    },

    /// Role management: waiting for the invitee contact.
    InviteContact {
        /// Role to grant.
        role: RoleType,
        /// Target project.
        project_id: i64,
    },

    /// Budget entry: waiting for the category pick (inline keyboard).
    ExpenseCategory {
        /// Target project.
        project_id: i64,
    },

    /// Budget entry: waiting for "work materials prepayment" amounts.
    ExpenseAmounts {
        /// Target project.
        project_id: i64,
        /// Chosen category.
        category: BudgetCategory,
    },

    /// Project picker shown; the callback dispatches back by intent.
    ProjectPicker {
        /// The command that asked for resolution (e.g. "ask", "report").
        intent: String,
    },

    /// Interactive AI chat mode.
    AiChat {
        /// Project under discussion.
        project_id: i64,
    },
}

/// Per-conversation data bag carried across steps.
#[derive(Debug, Clone, Default)]
pub struct ConvData {
    /// Project the flow operates on (picker result, stage flows).
    pub project_id: Option<i64>,
    /// Accumulated project-creation fields.
    pub draft: ProjectDraft,
    /// Pending question that triggered a picker (e.g. `/ask` text).
    pub pending_text: Option<String>,
    /// AI chat sliding window.
    pub history: Vec<ChatMessage>,
}

/// Accumulated fields of the project-creation wizard.
#[derive(Debug, Clone, Default)]
pub struct ProjectDraft {
    /// Project name.
    pub name: Option<String>,
    /// Address.
    pub address: Option<String>,
    /// Area in m².
    pub area_sqm: Option<f64>,
    /// Renovation type.
    pub renovation_type: Option<RenovationType>,
    /// Total budget.
    pub total_budget: Option<f64>,
    /// Selected custom-item keys.
    pub custom_items: Vec<String>,
}

/// One live conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Current step.
    pub state: ConvState,
    /// Data bag.
    pub data: ConvData,
}

impl Conversation {
    /// Start a conversation at the given step with an empty bag.
    pub fn new(state: ConvState) -> Self {
        Self {
            state,
            data: ConvData::default(),
        }
    }
}

/// Conversation key: `(chat_id, user_id)`.
pub type ConvKey = (i64, i64);

/// In-memory conversation state store.
#[derive(Debug, Default)]
pub struct FsmStore {
    inner: RwLock<HashMap<ConvKey, Conversation>>,
}

impl FsmStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current conversation for the key, if any.
    pub async fn get(&self, key: ConvKey) -> Option<Conversation> {
        self.inner.read().await.get(&key).cloned()
    }

    /// Start a fresh conversation, replacing any previous one.
    pub async fn start(&self, key: ConvKey, state: ConvState) {
        self.inner
            .write()
            .await
            .insert(key, Conversation::new(state));
    }

    /// Replace the whole conversation (state + data).
    pub async fn put(&self, key: ConvKey, conversation: Conversation) {
        self.inner.write().await.insert(key, conversation);
    }

    /// Advance the state, keeping the data bag.
    pub async fn set_state(&self, key: ConvKey, state: ConvState) {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&key) {
            Some(conv) => conv.state = state,
            None => {
                guard.insert(key, Conversation::new(state));
            }
        }
    }

    /// Mutate the data bag in place, creating nothing when absent.
    pub async fn update_data<F: FnOnce(&mut ConvData)>(&self, key: ConvKey, mutate: F) {
        if let Some(conv) = self.inner.write().await.get_mut(&key) {
            mutate(&mut conv.data);
        }
    }

    /// End the conversation.
    pub async fn clear(&self, key: ConvKey) {
        self.inner.write().await.remove(&key);
    }

    /// Number of live conversations (health reporting).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store has no live conversations.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
