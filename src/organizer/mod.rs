pub mod audit;
pub mod classify;
pub mod config;
pub mod dedupe;
pub mod fingerprint;
pub mod journal;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod placement;
pub mod remote;
pub mod review;
pub mod trajectory;
pub mod util;
pub mod warn;
