#[allow(unused)] // used in tests
pub fn init_default_logging() {
    utility_analysis::util::log_util::init();
}
