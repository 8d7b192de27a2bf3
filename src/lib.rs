//! Confine: compiles declarative per-application permissions into SELinux
//! policy modules.
//!
//! A project lists filesystem resources and, per spec file, the
//! applications that use them with the permissions they need. The
//! compiler labels every resource (reusing system labels where they
//! exist), derives a process domain per application, generates
//! type-enforcement rules and emits loadable module sources.
//!
//! See `DESIGN.md` for the module map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod settings;

pub mod diagnostics;
pub mod project;

pub mod context;
pub mod label;

pub mod catalog;
pub mod modules;

pub mod allocator;
pub mod generate;
pub mod policy;
pub mod rule;

pub mod compiler;
pub mod engine;
