use rocket::fairing::Fairing;
use wallet_gate::fairings::{PanicCatcher, RequestLogger};

#[test]
fn test_request_logger_info() {
    let info = RequestLogger.info();
    assert_eq!(info.name, "Request Logger");
    // Kind has no equality, only check it is reachable
    let _kind = info.kind;
}

#[test]
fn test_panic_catcher_info() {
    let info = PanicCatcher.info();
    assert_eq!(info.name, "Panic Catcher");
}

#[test]
fn test_fairing_names_differ() {
    assert_ne!(RequestLogger.info().name, PanicCatcher.info().name);
}
