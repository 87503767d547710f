pub mod array;
pub mod element;
pub mod field;

pub use array::{ArrayGeometry, ElementGeometry, FocusPhases, FULL_APERTURE};
pub use element::single_element_field;
pub use field::{BufferSettings, FieldBuffer, FieldGrid, DEFAULT_DENSE_FACTOR};
