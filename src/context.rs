//! Security labels and the records that bind them to files and ports.
//!
//! [`Context`] is the label itself. [`FileContext`] binds a path pattern and
//! a [`FileClass`] to a label, and [`PortContext`] binds a closed port
//! interval for one [`Protocol`] to a label.

use std::fmt;

use regex::Regex;

use crate::label;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// A security label: `user:role:type[:sensitivity[:categories]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context {
    /// SELinux user, e.g. `system_u`.
    pub user: String,
    /// SELinux role, e.g. `object_r`.
    pub role: String,
    /// Type or domain name.
    pub type_name: String,
    /// MLS sensitivity (may be a range such as `s0-s0`).
    pub sensitivity: String,
    /// MLS category set.
    pub categories: String,
}

impl Context {
    /// The default object label for a type: `system_u:object_r:<type>:s0`.
    pub fn object(type_name: impl Into<String>) -> Self {
        Self {
            user: "system_u".to_owned(),
            role: "object_r".to_owned(),
            type_name: type_name.into(),
            sensitivity: "s0".to_owned(),
            categories: String::new(),
        }
    }

    /// Parse the colon-separated textual form. Accepts three to five fields.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text.trim().split(':').collect();
        let field = |i: usize| fields.get(i).map(|s| (*s).to_owned()).unwrap_or_default();
        match fields.len() {
            3..=5 => Some(Self {
                user: field(0),
                role: field(1),
                type_name: field(2),
                sensitivity: field(3),
                categories: field(4),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.role, self.type_name)?;
        if self.sensitivity.is_empty() {
            return Ok(());
        }
        write!(f, ":{}", self.sensitivity)?;
        if !self.categories.is_empty() {
            write!(f, ":{}", self.categories)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File classes
// ---------------------------------------------------------------------------

/// Object class of a file resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileClass {
    /// Any class; expands to every concrete class in rules.
    Any,
    /// Block device.
    Blk,
    /// Character device.
    Chr,
    /// Directory.
    Dir,
    /// Named pipe.
    Fifo,
    /// Symbolic link.
    Lnk,
    /// Unix socket file.
    Sock,
    /// Regular file.
    File,
}

/// Every concrete file class, in rule emission order.
const CONCRETE: [FileClass; 7] = [
    FileClass::File,
    FileClass::Chr,
    FileClass::Blk,
    FileClass::Dir,
    FileClass::Fifo,
    FileClass::Lnk,
    FileClass::Sock,
];

impl FileClass {
    /// Every concrete class, in the order rules for [`FileClass::Any`] are emitted.
    pub fn concrete() -> &'static [FileClass] {
        &CONCRETE
    }

    /// Resolve a resource-list class keyword. Returns the class and whether
    /// the resource is an executable (`exec_file`).
    pub fn from_keyword(keyword: &str) -> Option<(Self, bool)> {
        let class = match keyword {
            "file" => Self::File,
            "exec_file" => return Some((Self::File, true)),
            "sock_file" => Self::Sock,
            "lnk_file" => Self::Lnk,
            "fifo_file" => Self::Fifo,
            "chr_file" => Self::Chr,
            "blk_file" => Self::Blk,
            "dir" => Self::Dir,
            "all" | "" => Self::Any,
            _ => return None,
        };
        Some((class, false))
    }

    /// Resolve a file-context file class symbol (`--`, `-d`, ...).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "--" => Some(Self::File),
            "-d" => Some(Self::Dir),
            "-c" => Some(Self::Chr),
            "-b" => Some(Self::Blk),
            "-p" => Some(Self::Fifo),
            "-l" => Some(Self::Lnk),
            "-s" => Some(Self::Sock),
            _ => None,
        }
    }

    /// The file-context symbol; empty for [`FileClass::Any`].
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Blk => "-b",
            Self::Chr => "-c",
            Self::Dir => "-d",
            Self::Fifo => "-p",
            Self::Lnk => "-l",
            Self::Sock => "-s",
            Self::File => "--",
        }
    }

    /// Kernel object class name; empty for [`FileClass::Any`].
    pub fn security_class(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Blk => "blk_file",
            Self::Chr => "chr_file",
            Self::Dir => "dir",
            Self::Fifo => "fifo_file",
            Self::Lnk => "lnk_file",
            Self::Sock => "sock_file",
            Self::File => "file",
        }
    }

    /// Kernel object classes a rule on this class must cover.
    pub fn security_classes(self) -> Vec<&'static str> {
        match self {
            Self::Any => CONCRETE.iter().map(|c| c.security_class()).collect(),
            other => vec![other.security_class()],
        }
    }

    /// Suffix used when synthesising a type name for this class.
    pub fn type_suffix(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Blk => "_blk",
            Self::Chr => "_chr",
            Self::Dir => "_dir",
            Self::Fifo => "_fifo",
            Self::Lnk => "_lnk",
            Self::Sock => "_sock",
            Self::File => "_file",
        }
    }

    /// Whether two classes are lookup-compatible: either is `Any`, or equal.
    pub fn compatible(self, other: Self) -> bool {
        self == Self::Any || other == Self::Any || self == other
    }
}

// ---------------------------------------------------------------------------
// File contexts
// ---------------------------------------------------------------------------

/// A path pattern bound to a label.
#[derive(Debug, Clone)]
pub struct FileContext {
    /// Regular-expression path pattern as written in file-context files.
    pub pattern: String,
    /// Class the entry applies to.
    pub class: FileClass,
    /// Label assigned to matching paths.
    pub context: Context,
    /// Longest literal prefix of `pattern`.
    pub prefix: String,
    /// Whether `pattern` contains regex metacharacters.
    pub has_wildcard: bool,
    /// False when the pattern failed to compile, the label was `<<none>>`,
    /// or the entry was masked.
    pub valid: bool,
    regex: Option<Regex>,
}

impl FileContext {
    /// Build an entry, compiling its pattern anchored at both ends.
    pub fn new(pattern: impl Into<String>, class: FileClass, context: Context) -> Self {
        let pattern = pattern.into();
        let prefix = label::fixed_prefix(&pattern).to_owned();
        let has_wildcard = prefix.len() != pattern.len();
        let regex = Regex::new(&format!("^(?:{pattern})$")).ok();
        let valid = regex.is_some() && context != Context::default();
        Self {
            pattern,
            class,
            context,
            prefix,
            has_wildcard,
            valid,
            regex,
        }
    }

    /// An entry that never matches, kept only so exact-pattern queries see it.
    pub fn unlabeled(pattern: impl Into<String>, class: FileClass) -> Self {
        let mut fc = Self::new(pattern, class, Context::default());
        fc.valid = false;
        fc
    }

    /// Whether this entry labels `path` for a lookup of `class`.
    pub fn matches(&self, path: &str, class: FileClass) -> bool {
        if !self.valid || !self.class.compatible(class) {
            return false;
        }
        self.regex.as_ref().is_some_and(|re| re.is_match(path))
    }

    /// One line of a file-context artifact, newline-terminated.
    pub fn line(&self) -> String {
        match self.class {
            FileClass::Any => format!("{}\t  \t{}\n", self.pattern, self.context),
            class => format!("{}\t{}\t{}\n", self.pattern, class.symbol(), self.context),
        }
    }
}

// ---------------------------------------------------------------------------
// Port contexts
// ---------------------------------------------------------------------------

/// Transport protocols that carry port labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// SCTP.
    Sctp,
    /// DCCP.
    Dccp,
}

impl Protocol {
    /// Parse a lowercase protocol name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "sctp" => Some(Self::Sctp),
            "dccp" => Some(Self::Dccp),
            _ => None,
        }
    }

    /// The protocol whose ports a socket class binds, if any.
    pub fn for_socket(class: &str) -> Option<Self> {
        match class {
            "tcp_socket" => Some(Self::Tcp),
            "udp_socket" => Some(Self::Udp),
            "sctp_socket" => Some(Self::Sctp),
            "dccp_socket" => Some(Self::Dccp),
            _ => None,
        }
    }
}

/// A labeled closed port interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortContext {
    /// First port of the interval.
    pub low: u16,
    /// Last port of the interval.
    pub high: u16,
    /// Protocol the label applies to.
    pub protocol: Protocol,
    /// Label of the interval.
    pub context: Context,
}

impl PortContext {
    /// Whether `port` over `protocol` falls inside this interval.
    pub fn contains(&self, port: u16, protocol: Protocol) -> bool {
        self.protocol == protocol && self.low <= port && port <= self.high
    }
}
