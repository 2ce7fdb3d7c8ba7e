//! Bot-section, exclusion-template, and page-mutation engine.
//!
//! Three cooperating pieces, in dependency order (leaves first):
//! [`bot_section`] is a pure-text sub-protocol for a machine-owned region
//! inside a human-edited page; [`exclusion`] is a pure-text scan for
//! `{{nobots}}`/`{{bots|...}}` opt-outs; [`page_mutator`] is the
//! read-modify-write orchestrator that uses both against a live wiki.

pub mod bot_section;
pub mod exclusion;
pub mod namespace_util;
pub mod page_mutator;
