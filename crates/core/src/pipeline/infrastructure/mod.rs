pub mod identity_pipeline;
pub mod motion_pipeline;
pub mod overlay;
