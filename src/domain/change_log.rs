use {
    super::error::AuditError,
    super::id::ActorId,
    super::snapshot::Snapshot,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{
        fmt,
        sync::atomic::{AtomicI64, Ordering},
    },
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ChangeAction {
    type Error = AuditError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(AuditError::Validation(format!(
                "unknown change action: {other}"
            ))),
        }
    }
}

/// One immutable entry in the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub action: ChangeAction,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<ActorId>,
    pub object_type: String,
    /// Copy of the entity id; outlives the entity and its link rows.
    pub target_id: Uuid,
    pub old_state: Option<Snapshot>,
    pub new_state: Option<Snapshot>,
    pub changed_fields: Option<Vec<String>>,
}

impl ChangeRecord {
    pub fn created(
        object_type: &str,
        target_id: Uuid,
        actor: Option<ActorId>,
        new_state: Snapshot,
    ) -> Self {
        Self::new(ChangeAction::Create, object_type, target_id, actor, None, Some(new_state), None)
    }

    pub fn updated(
        object_type: &str,
        target_id: Uuid,
        actor: Option<ActorId>,
        old_state: Snapshot,
        new_state: Snapshot,
        changed_fields: Option<Vec<String>>,
    ) -> Self {
        Self::new(
            ChangeAction::Update,
            object_type,
            target_id,
            actor,
            Some(old_state),
            Some(new_state),
            changed_fields,
        )
    }

    pub fn deleted(
        object_type: &str,
        target_id: Uuid,
        actor: Option<ActorId>,
        old_state: Snapshot,
    ) -> Self {
        Self::new(ChangeAction::Delete, object_type, target_id, actor, Some(old_state), None, None)
    }

    fn new(
        action: ChangeAction,
        object_type: &str,
        target_id: Uuid,
        actor: Option<ActorId>,
        old_state: Option<Snapshot>,
        new_state: Option<Snapshot>,
        changed_fields: Option<Vec<String>>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            timestamp: next_timestamp(),
            actor,
            object_type: object_type.to_string(),
            target_id,
            old_state,
            new_state,
            changed_fields,
        }
    }
}

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock time truncated to microseconds, strictly increasing within the
/// process. Microseconds are what PostgreSQL `timestamptz` keeps.
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => prev = actual,
        }
    }
}
