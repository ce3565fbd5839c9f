//! Plugin configuration derived from user params.
//!
//! A plugin template lists, per build phase, the plugins a build runs. The
//! build client fills plugin args from the user params and applies the site
//! customize conf before handing the result to the build.

mod configuration;
mod template;

pub use configuration::{ImagePluginsConfiguration, PluginsConfiguration, SourcePluginsConfiguration, render_plugins};
pub use template::{
    BUILDSTEP_PLUGINS, CustomizeConf, EXIT_PLUGINS, POSTBUILD_PLUGINS, PREBUILD_PLUGINS, PluginConf, PluginsTemplate,
};

use std::path::PathBuf;

use thiserror::Error;

use crate::params::ParamsError;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Can't open template '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid template: plugin phase '{0}' misses")]
    MissingPhase(String),

    #[error("no such plugin in template: \"{0}\"")]
    MissingPlugin(String),

    #[error("user params carry no build_json_dir")]
    NoBuildJsonDir,

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error("plugin args could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}
