#![forbid(unsafe_code)]

pub mod ph1c;
pub mod ph1e;
pub mod ph1n;
pub mod ph1sched;
pub mod ph1tts;
pub mod ph1x;
