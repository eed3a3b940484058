//! Case data model: the normalized shape every extraction is coerced into.

pub mod model;

pub use model::{Accident, Address, CaseData, Insurance, Person, Vehicle};
