pub mod card;
pub mod fields;
pub mod tasks;

pub use card::{CardData, CharacterBook, CharacterBookEntry, CharacterCard};
pub use fields::{fields_to_titles, CardField, CORE_FIELDS};
pub use tasks::{ConversionTask, RangeKind, TaskGroup, TaskRange};
