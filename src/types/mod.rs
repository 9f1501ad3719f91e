pub mod collection;
pub mod frequency;
pub mod image;
pub mod policy;
pub mod reducer;
pub mod window;
