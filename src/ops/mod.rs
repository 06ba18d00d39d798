pub mod autocrop;
pub mod effects;
pub mod shapes;
pub mod text;
pub mod transform;
pub mod wash;
