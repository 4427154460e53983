pub mod demographics;
pub mod keywords;
pub mod probability;

pub use demographics::alignment_modifier;
pub use keywords::{infer_category, Category, CategoryRule};
pub use probability::{parse_requirement, Requirement};
