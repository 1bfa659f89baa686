pub mod config;
pub mod jobs;
pub mod ledger;
pub mod mediawiki;
pub mod runner;
pub mod runtime;
pub mod store;
pub mod throttle;
pub mod transform;
pub mod wikitext;
pub mod worklist;
