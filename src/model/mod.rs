pub mod capability;
pub mod property;
pub mod requirement;
pub mod resource;

pub use capability::Capability;
pub use property::PropertyValue;
pub use requirement::Requirement;
pub use resource::Resource;
