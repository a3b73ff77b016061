mod pipeline;
mod run;

pub use run::run;
