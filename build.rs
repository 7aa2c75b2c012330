fn main() {
    // ESP-IDF env propagation is only meaningful when the espidf feature is
    // active (cross-building for the device).
    if std::env::var("CARGO_FEATURE_ESPIDF").is_ok() {
        embuild::espidf::sysenv::output();
    }
}
