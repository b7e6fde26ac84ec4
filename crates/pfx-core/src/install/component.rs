//! Static component definitions.
//!
//! Order matters: the Windows version is pinned after the redistributables
//! (a later verb must not reset it), and the product installer runs last.

use std::path::PathBuf;
use std::time::Duration;

use pfx_config::InstallSettings;
use serde::Serialize;

use crate::process::CommandSpec;
use crate::runtime::RuntimeEnv;

/// Program a command template runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramRef {
    /// The selected runtime executable.
    Runtime,
    /// The component helper (`winetricks`).
    Winetricks,
    Path(PathBuf),
}

/// Command with `{prefix}` and `{installer}` placeholders in its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTemplate {
    pub program: ProgramRef,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: ProgramRef, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Concrete command with the runtime overlay applied.
    pub fn render(&self, ctx: &CommandContext) -> CommandSpec {
        let program = match &self.program {
            ProgramRef::Runtime => ctx.runtime.runtime.clone(),
            ProgramRef::Winetricks => ctx.winetricks.clone(),
            ProgramRef::Path(path) => path.clone(),
        };
        let prefix = ctx.runtime.prefix.display().to_string();
        let installer = ctx.installer_source.display().to_string();
        let args = self
            .args
            .iter()
            .map(|a| a.replace("{prefix}", &prefix).replace("{installer}", &installer));
        ctx.runtime.apply(CommandSpec::new(program).args(args))
    }
}

/// Paths commands are rendered against.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub runtime: RuntimeEnv,
    pub winetricks: PathBuf,
    pub installer_source: PathBuf,
}

/// One independently retryable installation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSpec {
    pub name: String,
    pub install_command: CommandTemplate,
    pub max_retries: u32,
    #[serde(skip)]
    pub retry_delay: Duration,
    #[serde(skip)]
    pub timeout: Duration,
    /// A failure aborts the run; otherwise it becomes a warning.
    pub fatal: bool,
}

impl ComponentSpec {
    fn helper_verb(name: &str, verb: &str, fatal: bool, settings: &InstallSettings) -> Self {
        Self {
            name: name.to_string(),
            install_command: CommandTemplate::new(ProgramRef::Winetricks, ["-q", verb]),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
            timeout: settings.component_timeout(),
            fatal,
        }
    }
}

/// Helper verbs in install order: (name, verb, fatal).
const HELPER_VERBS: &[(&str, &str, bool)] = &[
    ("msxml3", "msxml3", true),
    ("msxml6", "msxml6", true),
    ("atmlib", "atmlib", true),
    ("corefonts", "corefonts", false),
    ("fontsmooth-rgb", "fontsmooth=rgb", false),
    ("gdiplus", "gdiplus", true),
    ("vcrun2010", "vcrun2010", true),
    ("vcrun2012", "vcrun2012", true),
    ("vcrun2013", "vcrun2013", true),
    ("vcrun2019", "vcrun2019", true),
    ("win10", "win10", true),
];

/// Name of the product installer component.
pub const PRODUCT_COMPONENT: &str = "photoshop";

/// The canonical component sequence, minus `skip_components`.
pub fn default_components(settings: &InstallSettings) -> Vec<ComponentSpec> {
    let mut components: Vec<ComponentSpec> = HELPER_VERBS
        .iter()
        .map(|(name, verb, fatal)| ComponentSpec::helper_verb(name, verb, *fatal, settings))
        .collect();

    components.push(ComponentSpec {
        name: PRODUCT_COMPONENT.to_string(),
        install_command: CommandTemplate::new(
            ProgramRef::Runtime,
            [format!("{{installer}}/{}", settings.installer_exe)],
        ),
        // Single attempt per session; a rerun resumes from the last checkpoint.
        max_retries: 1,
        retry_delay: settings.retry_delay(),
        timeout: settings.installer_timeout(),
        fatal: true,
    });

    components.retain(|c| !settings.skip_components.iter().any(|s| s == &c.name));
    components
}
