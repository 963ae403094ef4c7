pub mod constants;
pub mod error;
pub mod forest;
pub mod pipeline;
#[cfg(test)]
pub mod test;
pub mod util {
    pub mod feature_engineering;
    pub mod file_utils;
    pub mod model_logger;
    pub mod plotting;
    pub mod pre_processor;
    #[cfg(test)]
    pub mod test_utils;
}

/// Package metadata generated at build time
pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
