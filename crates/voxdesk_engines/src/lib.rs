#![forbid(unsafe_code)]

pub mod ph1e;
pub mod ph1n;
pub mod ph1n_entities;
pub mod ph1n_lexicon;
pub mod ph1n_priority;
pub mod ph1n_time;
