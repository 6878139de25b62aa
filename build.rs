fn main() {
    // Host builds (tests and the simulator) do not link ESP-IDF.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
