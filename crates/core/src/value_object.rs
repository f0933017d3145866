//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. A pole category
/// or a length measurement has no identity of its own; two values with the
/// same attributes are interchangeable. Entities (lots, batches, records)
/// keep identity through their ids instead.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
