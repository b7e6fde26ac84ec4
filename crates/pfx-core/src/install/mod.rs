//! Component installation.

pub mod component;
pub mod retry;

pub use component::{
    default_components, CommandContext, CommandTemplate, ComponentSpec, ProgramRef,
    PRODUCT_COMPONENT,
};
pub use retry::{InstallContext, InstallOutcome, RetryingInstaller};
