//! Confinement backends.
//!
//! Backends form a closed set registered in [`ENGINES`]. Each one can
//! build a project into loadable modules and report whether a module is
//! present on the host.

use std::fmt;
use std::path::Path;

use crate::compiler::{BuildReport, Compiler};
use crate::error::Result;
use crate::modules::{ModuleStatus, ModuleStore};
use crate::project::Project;

/// A confinement backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// SELinux policy modules.
    SELinux,
}

/// Every backend compiled into this binary.
pub static ENGINES: &[Engine] = &[Engine::SELinux];

impl Engine {
    /// Short name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Engine::SELinux => "selinux",
        }
    }

    /// One-line human description.
    pub fn description(self) -> &'static str {
        match self {
            Engine::SELinux => "compiles projects into SELinux type-enforcement modules",
        }
    }

    /// Look a backend up by name, ignoring case.
    pub fn find(name: &str) -> Option<Engine> {
        ENGINES
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(name))
    }

    /// Build `project` into `out`.
    pub fn build(self, compiler: &Compiler, project: &Project, out: &Path) -> Result<BuildReport> {
        match self {
            Engine::SELinux => compiler.build(project, out),
        }
    }

    /// Installation state of `module` on the host.
    pub fn status(self, compiler: &Compiler, module: &str) -> Result<ModuleStatus> {
        match self {
            Engine::SELinux => {
                let settings = compiler.settings();
                ModuleStore::new(&settings.modules.store_root, settings.system.policy_type())
                    .status(module)
            }
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
