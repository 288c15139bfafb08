//! Network inventory: the tracked model shipped with the crate.
//!
//! Interfaces and consoles share the `data_sockets` base table and are read
//! back through [`Socket`].

use {
    super::entity::{BaseTable, DependentSink, Layout, LinkTable, Trackable},
    super::error::AuditError,
    super::polymorphic::Polymorphic,
    super::snapshot::{self, Snapshot},
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

pub const DATA_SOCKETS: BaseTable = BaseTable {
    table: "data_sockets",
    discriminator_column: "target_model_name",
    fields: &["name", "is_virtual", "device_id"],
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<Uuid>,
    pub name: String,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Trackable for Device {
    const ENTITY_TYPE: &'static str = "Device";
    const LAYOUT: Layout = Layout::Table("devices");

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), AuditError> {
        check_name(&self.name, 30)
    }

    async fn remove_dependents<D: DependentSink>(sink: &mut D, id: Uuid) -> Result<(), AuditError> {
        sink.remove::<Interface>("device_id", id).await?;
        sink.remove::<Console>("device_id", id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: Option<Uuid>,
    pub name: String,
    pub is_virtual: bool,
    pub device_id: Uuid,
}

impl Trackable for Interface {
    const ENTITY_TYPE: &'static str = "Interface";
    const LAYOUT: Layout = Layout::Inherits {
        base: DATA_SOCKETS,
        table: "interfaces",
        discriminator: "Interface",
    };

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), AuditError> {
        check_name(&self.name, 30)
    }

    async fn remove_dependents<D: DependentSink>(sink: &mut D, id: Uuid) -> Result<(), AuditError> {
        remove_cables(sink, id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Console {
    pub id: Option<Uuid>,
    pub name: String,
    pub is_virtual: bool,
    pub device_id: Uuid,
    pub bauds: i32,
}

impl Trackable for Console {
    const ENTITY_TYPE: &'static str = "Console";
    const LAYOUT: Layout = Layout::Inherits {
        base: DATA_SOCKETS,
        table: "consoles",
        discriminator: "Console",
    };

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), AuditError> {
        check_name(&self.name, 30)?;
        if self.bauds <= 0 {
            return Err(AuditError::Validation(format!(
                "console bauds must be positive, got: {}",
                self.bauds
            )));
        }
        Ok(())
    }

    async fn remove_dependents<D: DependentSink>(sink: &mut D, id: Uuid) -> Result<(), AuditError> {
        remove_cables(sink, id).await
    }
}

/// Cable between two sockets. Not tracked as a socket itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    pub id: Option<Uuid>,
    pub color: String,
    pub side_a: Option<Uuid>,
    pub side_b: Option<Uuid>,
}

impl Trackable for Cable {
    const ENTITY_TYPE: &'static str = "Cable";
    const LAYOUT: Layout = Layout::Table("cables");

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), AuditError> {
        check_name(&self.color, 20)?;
        match (self.side_a, self.side_b) {
            (Some(a), Some(b)) if a == b => Err(AuditError::Validation(
                "cable cannot connect a socket to itself".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Cables attached to a socket on either side go with the socket.
async fn remove_cables<D: DependentSink>(sink: &mut D, socket: Uuid) -> Result<(), AuditError> {
    sink.remove::<Cable>("side_a", socket).await?;
    sink.remove::<Cable>("side_b", socket).await
}

fn check_name(value: &str, max: usize) -> Result<(), AuditError> {
    if value.is_empty() || value.chars().count() > max {
        return Err(AuditError::Validation(format!(
            "expected 1..={max} characters, got: {value:?}"
        )));
    }
    Ok(())
}

/// Any concrete socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Socket {
    Interface(Interface),
    Console(Console),
}

impl Socket {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Interface(i) => i.id,
            Self::Console(c) => c.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Interface(i) => &i.name,
            Self::Console(c) => &c.name,
        }
    }
}

impl Polymorphic for Socket {
    const BASE: BaseTable = DATA_SOCKETS;

    fn subtype_table(discriminator: &str) -> Option<&'static str> {
        match discriminator {
            Interface::ENTITY_TYPE => Some(Interface::LAYOUT.table()),
            Console::ENTITY_TYPE => Some(Console::LAYOUT.table()),
            _ => None,
        }
    }

    fn materialize(discriminator: &str, row: Snapshot) -> Result<Self, AuditError> {
        match discriminator {
            Interface::ENTITY_TYPE => Ok(Self::Interface(snapshot::deserialize(&row)?)),
            Console::ENTITY_TYPE => Ok(Self::Console(snapshot::deserialize(&row)?)),
            other => Err(AuditError::Integrity(format!(
                "no socket subtype named {other}"
            ))),
        }
    }
}

/// Link tables of every tracked type, registered at startup.
pub fn tracked_link_tables() -> Vec<LinkTable> {
    vec![
        Device::link_table(),
        Interface::link_table(),
        Console::link_table(),
        Cable::link_table(),
    ]
}
