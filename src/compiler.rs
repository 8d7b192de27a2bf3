//! End-to-end compilation of a project into policy modules.
//!
//! The pipeline is catalog load, allocation, rule generation, assembly and
//! emission. A project compiles into one module when monolithic, otherwise
//! into a `<project>_public` base module holding every definition plus one
//! `<project>_<spec>` module per spec file holding that spec's rules.
//!
//! A failing spec module is removed and reported while the others are
//! still written; a failing base module or an unusable system state aborts
//! the whole build.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::allocator::{self, Allocation};
use crate::catalog::Catalog;
use crate::context::FileClass;
use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result, Scope};
use crate::generate::{defaults, Generator};
use crate::label;
use crate::modules::ModuleStore;
use crate::policy::{emit, Policy};
use crate::project::{Project, Spec};
use crate::rule::{build, Rule};
use crate::settings::{Settings, ToolchainSettings};

/// Attribute carried by every non-private file type.
pub const FILE_ATTRIBUTE: &str = "file_type";

/// Name of the module holding a monolithic project.
pub fn single_module_name(project: &str) -> String {
    project.to_owned()
}

/// Name of the base module of a split project.
pub fn base_module_name(project: &str) -> String {
    format!("{project}_public")
}

/// Name of the module compiled from `spec`.
pub fn spec_module_name(project: &str, spec: &Spec) -> String {
    format!("{project}_{}", spec.stem())
}

/// One module written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput {
    /// Module name.
    pub name: String,
    /// Directory holding its artifacts.
    pub dir: PathBuf,
    /// Whether `<name>.pp` was produced.
    pub packaged: bool,
}

/// Outcome of building one project.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Modules written successfully.
    pub modules: Vec<ModuleOutput>,
    /// Modules that failed, with the reason. Their directories are removed.
    pub failures: Vec<(String, CompileError)>,
}

impl BuildReport {
    /// Whether every module was written.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compiles projects against the host described by its settings.
#[derive(Debug, Clone)]
pub struct Compiler {
    settings: Settings,
    diagnostics: Diagnostics,
}

impl Compiler {
    /// A compiler using `settings`, reporting to `diagnostics`.
    pub fn new(settings: Settings, diagnostics: Diagnostics) -> Self {
        Self {
            settings,
            diagnostics,
        }
    }

    /// The settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load a fresh catalog and build `project` into `out`.
    pub fn build(&self, project: &Project, out: &Path) -> Result<BuildReport> {
        let catalog = Catalog::load(&self.settings.system).scoped(|| "system catalog".to_owned())?;
        self.build_with_catalog(project, catalog, out)
    }

    /// Build `project` into `out` against an already-loaded catalog.
    pub fn build_with_catalog(
        &self,
        project: &Project,
        mut catalog: Catalog,
        out: &Path,
    ) -> Result<BuildReport> {
        let diag = self.diagnostics.for_origin(project.name.clone());
        diag.info(format!("building project {}", project.name));

        let mut report = BuildReport::default();
        let policies = self.assemble(project, &mut catalog, &mut report)?;
        for (name, _) in &report.failures {
            remove_dir(&out.join(name));
        }

        let list = resource_list(project);
        for policy in policies {
            let dir = out.join(&policy.name);
            match self.write_module(&policy, &dir, &list) {
                Ok(packaged) => {
                    diag.info(format!("module {} written to {}", policy.name, dir.display()));
                    report.modules.push(ModuleOutput {
                        name: policy.name.clone(),
                        dir,
                        packaged,
                    });
                }
                Err(err) => {
                    remove_dir(&dir);
                    diag.error(format!("module {} failed: {err}", policy.name));
                    report.failures.push((policy.name.clone(), err));
                }
            }
        }

        info!(
            project = %project.name,
            written = report.modules.len(),
            failed = report.failures.len(),
            "build finished"
        );
        Ok(report)
    }

    /// Allocate labels and assemble every module of `project` in memory.
    /// Spec modules that fail are recorded in `report` and left out.
    pub fn assemble(
        &self,
        project: &Project,
        catalog: &mut Catalog,
        report: &mut BuildReport,
    ) -> Result<Vec<Policy>> {
        let store = self.settings.modules.enabled.then(|| {
            ModuleStore::new(
                &self.settings.modules.store_root,
                self.settings.system.policy_type(),
            )
        });
        let alloc = allocator::allocate(project, catalog, store.as_ref())
            .scoped(|| format!("project {}", project.name))?;
        let catalog = &*catalog;

        let monolithic = project.selinux.policy.monolithic;
        let base_name = if monolithic {
            single_module_name(&project.name)
        } else {
            base_module_name(&project.name)
        };

        let mut base = Policy::new(&base_name, &project.version)?;
        self.fill_base(&mut base, project, &alloc, catalog)
            .scoped(|| format!("module {base_name}"))?;

        let mut policies = Vec::new();
        if monolithic {
            for spec in &project.specs {
                self.add_spec_rules(&mut base, spec, &alloc, catalog)
                    .scoped(|| format!("module {base_name}, spec {}", spec.name))?;
            }
            policies.push(base);
        } else {
            policies.push(base);
            for spec in &project.specs {
                let name = spec_module_name(&project.name, spec);
                let built = Policy::new(&name, &project.version).and_then(|mut policy| {
                    self.add_spec_rules(&mut policy, spec, &alloc, catalog)?;
                    Ok(policy)
                });
                match built.scoped(|| format!("module {name}")) {
                    Ok(policy) => policies.push(policy),
                    Err(err) if err.is_fatal_for_all_modules() => return Err(err),
                    Err(err) => {
                        self.diagnostics
                            .for_origin(name.clone())
                            .error(format!("module {name} failed: {err}"));
                        report.failures.push((name, err));
                    }
                }
            }
        }

        for policy in &mut policies {
            let diag = self.diagnostics.for_origin(policy.name.clone());
            for rep in policy.resolve_type_conflicts() {
                diag.warn(format!(
                    "type {} will be replaced by {} due to type_transition rule conflict",
                    rep.from, rep.to
                ));
            }
        }
        Ok(policies)
    }

    /// Extra rules, file and domain definitions.
    fn fill_base(
        &self,
        policy: &mut Policy,
        project: &Project,
        alloc: &Allocation,
        catalog: &Catalog,
    ) -> Result<()> {
        for text in &project.selinux.extra_rules {
            let rule = Rule::parse(text).scoped(|| "extra rules".to_owned())?;
            policy
                .add_rules(catalog, [rule])
                .scoped(|| "extra rules".to_owned())?;
        }

        for item in &alloc.files {
            if !item.has_fc_defined {
                policy.add_file_context(item.file_context());
            }
            let ty = item.type_name();
            if item.has_type_defined {
                policy.add_type_require(ty);
            } else if item.is_private {
                policy.add_type_define(ty);
                policy
                    .add_rules(catalog, build::private_file_type(ty, item.class))
                    .scoped(|| format!("private file {}", item.path))?;
            } else {
                policy.add_type_attr_define(ty, FILE_ATTRIBUTE);
            }
        }

        for app in &alloc.apps {
            policy.add_type_attr_define(&app.domain, defaults::DOMAIN_ATTRIBUTE);
            if app.is_unconfined {
                for attr in defaults::UNCONFINED_ATTRIBUTES {
                    policy.add_type_attr_define(&app.domain, attr);
                }
            }
            if app.is_permissive {
                policy.add_permissive(&app.domain);
            }
            for role in catalog.roles() {
                policy.add_role_type_define(role, &app.domain);
            }
        }
        Ok(())
    }

    /// Default, entry and permission rules of every application in `spec`.
    fn add_spec_rules(
        &self,
        policy: &mut Policy,
        spec: &Spec,
        alloc: &Allocation,
        catalog: &Catalog,
    ) -> Result<()> {
        let diagnostics = self.diagnostics.for_origin(policy.name.clone());
        let gen = Generator {
            alloc,
            catalog,
            fallback_exec_domain: &self.settings.compiler.fallback_exec_domain,
            diagnostics: &diagnostics,
        };

        for entry in &spec.application_list {
            let path = &entry.application.path;
            let (Some(app), Some(file)) = (alloc.app(path), alloc.file(path)) else {
                return Err(CompileError::UndefinedReference {
                    kind: "application",
                    name: path.clone(),
                });
            };

            let mut rules = defaults::base_rules(&app.domain);
            if entry.application.is_unconfined {
                rules.extend(defaults::unconfined_rules(
                    &app.domain,
                    catalog.has_class("capability2"),
                ));
            }
            rules.extend(defaults::entry_rules(&app.domain, file.type_name()));

            for perm in &entry.permission_list {
                let generated = gen.rules(app, perm).scoped(|| {
                    format!("{} permission of {path}", perm.kind)
                })?;
                rules.extend(generated);
            }

            policy
                .add_rules(catalog, rules)
                .scoped(|| format!("application {path}"))?;
        }
        Ok(())
    }

    /// Write every artifact of `policy` into `dir`, replacing what was
    /// there. Returns whether a binary package was produced.
    pub fn write_module(&self, policy: &Policy, dir: &Path, resources: &[String]) -> Result<bool> {
        remove_dir(dir);
        std::fs::create_dir_all(dir).map_err(|e| CompileError::io(dir, e))?;

        let te = dir.join(format!("{}.te", policy.name));
        let fc = dir.join(format!("{}.fc", policy.name));
        write(&te, &emit::te_text(policy))?;
        write(&fc, &emit::fc_text(policy))?;
        write(&dir.join("resourcelist"), &lines(resources))?;
        write(&dir.join("config"), &config_text(policy))?;
        write(&dir.join("restorecon.sh"), &restorecon_text(policy))?;

        if !self.settings.toolchain.enabled {
            return Ok(false);
        }
        package(&self.settings.toolchain, dir, &policy.name)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Deduplicated paths of every resource, for relabeling tools.
pub fn resource_list(project: &Project) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut paths = Vec::new();
    for res in &project.resources {
        let is_dir = FileClass::from_keyword(&res.class).is_some_and(|(c, _)| c == FileClass::Dir);
        for path in label::resource_list_paths(&res.path, is_dir) {
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Module name and `|`-joined defined types, in shell variable syntax.
pub fn config_text(policy: &Policy) -> String {
    format!(
        "MODULE={}\nTYPES=\"{}\"\n",
        policy.name,
        policy.defined_types().join("|")
    )
}

/// Script relabeling every tree the module's file contexts cover.
pub fn restorecon_text(policy: &Policy) -> String {
    let mut scopes = BTreeSet::new();
    for fc in &policy.file_contexts {
        let prefix = label::unescape(label::fixed_prefix(&fc.pattern));
        if !prefix.is_empty() {
            scopes.insert(prefix);
        }
    }
    let mut out = String::from("#!/bin/sh\n");
    for scope in scopes {
        let _ = writeln!(out, "restorecon -iR '{scope}'");
    }
    out
}

fn lines(items: &[String]) -> String {
    items.iter().map(|i| format!("{i}\n")).collect()
}

fn write(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| CompileError::io(path, e))
}

fn remove_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(dir = %dir.display(), error = %err, "failed to remove module directory"),
    }
}

/// Run `checkmodule` and `semodule_package` on the module in `dir`.
fn package(tools: &ToolchainSettings, dir: &Path, name: &str) -> Result<()> {
    let te = dir.join(format!("{name}.te"));
    let fc = dir.join(format!("{name}.fc"));
    let module = dir.join(format!("{name}.mod"));
    let pp = dir.join(format!("{name}.pp"));

    let mut checkmodule = Command::new(&tools.checkmodule);
    checkmodule.arg("-mMo").arg(&module).arg(&te);
    run_tool(checkmodule, &tools.checkmodule)?;

    let mut semodule_package = Command::new(&tools.semodule_package);
    semodule_package
        .arg("-o")
        .arg(&pp)
        .arg("-m")
        .arg(&module)
        .arg("-f")
        .arg(&fc);
    run_tool(semodule_package, &tools.semodule_package)
}

fn run_tool(mut cmd: Command, tool: &Path) -> Result<()> {
    let tool_name = tool.display().to_string();
    let output = cmd.output().map_err(|e| CompileError::Toolchain {
        tool: tool_name.clone(),
        output: e.to_string(),
    })?;
    if output.status.success() {
        return Ok(());
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(CompileError::Toolchain {
        tool: tool_name,
        output: text.trim().to_owned(),
    })
}
