//! Type and context allocation.
//!
//! Every declared resource gets a label before any rule is generated:
//! either the one the system already assigns (`isSysFile`), an explicitly
//! named type, or a synthesised `auto_*` type. Newly labeled resources are
//! recorded in the catalog's temp tier so later lookups (the parent
//! directory of another resource, for instance) see them.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::context::{Context, FileClass, FileContext};
use crate::error::{CompileError, Result, Scope};
use crate::label;
use crate::modules::ModuleStore;
use crate::project::{Project, Resource};

/// One declared file resource after labeling.
#[derive(Debug, Clone)]
pub struct FileItem {
    /// Path as declared.
    pub path: String,
    /// File-context pattern for the path.
    pub se_path: String,
    /// Declared class.
    pub class: FileClass,
    /// Label of the resource itself.
    pub context: Context,
    /// Label of the directory the resource lives in.
    pub inherited: Context,
    /// Domain entered when the file is executed, if known.
    pub exec_domain: Option<String>,
    /// Type kept outside the `file_type` attribute.
    pub is_private: bool,
    /// Declared as `exec_file`.
    pub is_exec: bool,
    /// The type already exists and must be required, not defined.
    pub has_type_defined: bool,
    /// The system already labels this path; no file context is emitted.
    pub has_fc_defined: bool,
}

impl FileItem {
    /// The resource's own type.
    pub fn type_name(&self) -> &str {
        &self.context.type_name
    }

    /// The parent directory's type.
    pub fn inherited_type(&self) -> &str {
        &self.inherited.type_name
    }

    /// File-context entry labeling this resource.
    pub fn file_context(&self) -> FileContext {
        FileContext::new(self.se_path.clone(), self.class, self.context.clone())
    }
}

/// One confined application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppItem {
    /// Path of the executable, matching a [`FileItem`].
    pub path: String,
    /// Domain the process runs in.
    pub domain: String,
    /// Denials are logged, not enforced.
    pub is_permissive: bool,
    /// The domain runs unconfined.
    pub is_unconfined: bool,
}

/// Everything the allocator decided for one project.
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    /// Labeled resources, in declaration order.
    pub files: Vec<FileItem>,
    /// Applications, in first-mention order.
    pub apps: Vec<AppItem>,
    /// Types provided by an earlier build of this project.
    pub mask_types: Vec<String>,
    /// File-context patterns installed by an earlier build of this project.
    pub mask_paths: Vec<String>,
}

impl Allocation {
    /// Resource declared at `path`.
    pub fn file(&self, path: &str) -> Option<&FileItem> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Application whose executable is `path`.
    pub fn app(&self, path: &str) -> Option<&AppItem> {
        self.apps.iter().find(|a| a.path == path)
    }
}

/// Module names an earlier build of `project` may have installed.
pub fn own_module_names(project: &str) -> [String; 2] {
    [project.to_owned(), format!("{project}_public")]
}

/// Label every resource and application of `project`.
///
/// `store`, when given, is consulted for modules left by a previous build
/// so their labels are not mistaken for system ones.
pub fn allocate(
    project: &Project,
    catalog: &mut Catalog,
    store: Option<&ModuleStore>,
) -> Result<Allocation> {
    let mut alloc = Allocation::default();

    if let Some(store) = store {
        set_mask(&mut alloc, catalog, store, &own_module_names(&project.name))?;
    }

    for res in &project.resources {
        let item = allocate_file(&alloc, catalog, res).scoped(|| format!("resource {}", res.path))?;
        if !item.has_fc_defined {
            catalog.add_temp(item.file_context());
        }
        debug!(path = %item.path, ty = %item.type_name(), "allocated resource");
        alloc.files.push(item);
    }

    // Parents may themselves be resources, so this runs once every
    // resource is in the temp tier.
    for item in &mut alloc.files {
        let dir = label::fold(&label::get_dir(&item.path));
        let parent = catalog.lookup(&dir, FileClass::Dir).ok_or_else(|| {
            CompileError::Config(format!(
                "no file context labels {dir}, parent of {}",
                item.path
            ))
        })?;
        item.inherited = parent.context.clone();
    }

    allocate_apps(project, &mut alloc)?;

    info!(
        project = %project.name,
        files = alloc.files.len(),
        apps = alloc.apps.len(),
        "allocation complete"
    );
    Ok(alloc)
}

fn set_mask(
    alloc: &mut Allocation,
    catalog: &mut Catalog,
    store: &ModuleStore,
    modules: &[String],
) -> Result<()> {
    for module in modules {
        let Some(cil) = store.cil_info(module).scoped(|| format!("installed module {module}"))?
        else {
            continue;
        };
        debug!(
            module = %module,
            types = cil.provided_types.len(),
            paths = cil.filecon_paths.len(),
            "masking installed module"
        );
        alloc.mask_paths.extend(cil.filecon_paths);
        alloc.mask_types.extend(cil.provided_types);
    }
    for pattern in &alloc.mask_paths {
        catalog.mask(pattern);
    }
    Ok(())
}

fn allocate_file(alloc: &Allocation, catalog: &Catalog, res: &Resource) -> Result<FileItem> {
    let (class, is_exec) = FileClass::from_keyword(&res.class).ok_or_else(|| {
        CompileError::Config(format!("unknown resource type {:?}", res.class))
    })?;
    let opts = &res.selinux;
    let explicit_type = opts.type_name.as_deref().filter(|t| !t.is_empty());
    let exec_domain = opts.domain.clone().filter(|d| !d.is_empty());

    if let Some(domain) = &exec_domain {
        if !label::valid_type_name(domain) {
            return Err(CompileError::Config(format!("invalid domain name {domain}")));
        }
    }

    let se_path = label::se_path(&res.path);
    let found = catalog.lookup(&label::fold(&res.path), class);

    let mut item = FileItem {
        path: res.path.clone(),
        se_path,
        class,
        context: Context::default(),
        inherited: Context::default(),
        exec_domain,
        is_private: opts.is_private_file,
        is_exec,
        has_type_defined: false,
        has_fc_defined: false,
    };

    if opts.is_sys_file {
        if opts.is_private_file {
            return Err(CompileError::Config(
                "isSysFile and isPrivateFile can't both be set".to_owned(),
            ));
        }
        if explicit_type.is_some() {
            return Err(CompileError::Config(
                "isSysFile and type can't both be set".to_owned(),
            ));
        }
        let found = found.ok_or_else(|| {
            CompileError::Config(format!("the system does not label {}", res.path))
        })?;
        item.context = found.context.clone();
        item.has_type_defined = true;
        item.has_fc_defined = true;
        return Ok(item);
    }

    if found.is_some_and(|fc| fc.pattern == item.se_path) {
        return Err(CompileError::Config(
            "the path is already labeled; set isSysFile to keep its label".to_owned(),
        ));
    }

    match explicit_type {
        Some(ty) => {
            if !label::valid_type_name(ty) {
                return Err(CompileError::Config(format!("invalid type name {ty}")));
            }
            item.context = Context::object(ty);
            if alloc.mask_types.iter().any(|t| t == ty) {
                return Ok(item);
            }
            if catalog.attr_defined(ty) {
                return Err(CompileError::Config(format!(
                    "type {ty} is already an attribute in the system policy"
                )));
            }
            item.has_type_defined = catalog.type_defined(ty);
        }
        None => {
            item.context = Context::object(label::auto_type_name(&res.path, class, is_exec));
        }
    }
    Ok(item)
}

fn allocate_apps(project: &Project, alloc: &mut Allocation) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in project.specs.iter().flat_map(|s| &s.application_list) {
        let app = &entry.application;
        let Some(file) = alloc.files.iter_mut().find(|f| f.path == app.path) else {
            return Err(CompileError::UndefinedReference {
                kind: "application",
                name: app.path.clone(),
            });
        };
        let domain = match &file.exec_domain {
            Some(domain) => domain.clone(),
            None => {
                let domain = label::trans_domain(file.type_name());
                file.exec_domain = Some(domain.clone());
                domain
            }
        };

        if seen.insert(app.path.clone()) {
            alloc.apps.push(AppItem {
                path: app.path.clone(),
                domain,
                is_permissive: app.is_permissive,
                is_unconfined: app.is_unconfined,
            });
        } else if let Some(existing) = alloc.apps.iter_mut().find(|a| a.path == app.path) {
            existing.is_permissive |= app.is_permissive;
            existing.is_unconfined |= app.is_unconfined;
        }
    }
    Ok(())
}
