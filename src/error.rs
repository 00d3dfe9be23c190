//! Error kinds returned at the public surface of the ECS core.

use crate::entity::EntityId;

/// Every recoverable (and one fatal-by-convention) error kind the core can
/// surface. Internal invariant violations that should never happen given a
/// correctly-used API (column desync, free-id reuse races) are left as
/// `panic!`/`debug_assert!` rather than variants here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("no such entity: {entity:?}")]
    NoSuchEntity { entity: EntityId },

    #[error("component already present on entity {entity:?}")]
    ComponentAlreadyPresent { entity: EntityId },

    #[error("component not present on entity {entity:?}")]
    ComponentNotPresent { entity: EntityId },

    #[error("array already present on entity {entity:?}")]
    ArrayAlreadyPresent { entity: EntityId },

    #[error("array not present on entity {entity:?}")]
    ArrayNotPresent { entity: EntityId },

    #[error("tag already present on entity {entity:?}")]
    TagAlreadyPresent { entity: EntityId },

    #[error("tag not present on entity {entity:?}")]
    TagNotPresent { entity: EntityId },

    #[error("type not registered")]
    NotRegistered,

    #[error("reference index {rint} out of range for entity {entity:?}")]
    ReferenceOutOfRange { entity: EntityId, rint: u32 },

    #[error("index {index} out of range")]
    OutOfRange { index: u32 },

    #[error("operation replay requires a non-empty selection")]
    EmptySelection,

    #[error("query used after a structural world mutation")]
    StaleQuery,

    #[error("deserialization target schema does not cover a type present in the stream")]
    SchemaMismatch,

    #[error("set_parent would introduce a cycle for entity {entity:?}")]
    CycleDetected { entity: EntityId },
}
