use hyp_logger::SinkLogger;
use log::LevelFilter;

static LOGGER: SinkLogger<String> = SinkLogger::new(LevelFilter::Debug, String::new());

#[test]
fn installs_once_and_routes_macros() {
    LOGGER.init().unwrap();
    assert!(LOGGER.init().is_err());
    assert_eq!(log::max_level(), LevelFilter::Debug);

    log::debug!(target: "pool", "{} pages", 16);
    log::trace!(target: "pool", "not shown");
    let out = LOGGER.with_sink(|s| core::mem::take(s));
    assert_eq!(out, "[DEBUG] pool: 16 pages\n");
}
