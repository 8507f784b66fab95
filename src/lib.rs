pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod project;
pub mod properties;

pub use config::SwitcherConfiguration;
pub use engine::{BuildEngine, EvaluatedProject, ProjectCollection, XmlBuildEngine};
pub use error::{Error, Result};
pub use format::ProjectFormat;
pub use project::{
    generates_package, has_version, is_supported_project, load_project, load_project_with,
    load_project_with_args, load_project_with_configuration, load_project_with_properties,
    ProjectInformation,
};
pub use properties::GlobalProperties;
