//! The library code for `grove`, an index over a digital garden: a tree of
//! markdown documents with YAML frontmatter, split into notes, TILs,
//! bookmarks and how-tos. The work breaks down into three steps:
//!
//! 1. Reading raw documents from the content tree ([`crate::store`]) and
//!    parsing them into [`item::ContentItem`]s ([`crate::parser`])
//! 2. Extracting the internal links each document makes
//!    ([`crate::links`]) and assembling them into a two-way link graph
//!    ([`crate::graph`])
//! 3. Answering queries against the result ([`crate::site`])
//!
//! The third step is where the moving parts are. A [`site::Site`] publishes
//! each rebuild as an immutable snapshot so readers never observe a
//! half-built index, memoizes listings and backlinks in
//! [`cache::TimedCache`]s, and validates reader-chosen trails through the
//! garden ([`crate::path`]). Listings merge every content type into one
//! filtered, sorted, paginated sequence ([`crate::aggregate`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod graph;
pub mod item;
pub mod links;
pub mod markdown;
pub mod parser;
pub mod path;
pub mod site;
pub mod store;
pub mod tag;
