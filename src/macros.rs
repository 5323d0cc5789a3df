#[macro_export]
macro_rules! app_log {
    ($($arg:tt)*) => {{
        use chrono::Local;
        let now = Local::now().format("%H:%M:%S%.3f");
        let prefix = format!("\x1b[90m[{}]\x1b[0m \x1b[94m[App]\x1b[0m", now);
        println!("{} {}", prefix, format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! app_debug {
    ($($arg:tt)*) => {{
        if std::env::var("TIDEPOOL_DEBUG").map(|v| v == "true").unwrap_or(false) {
        use chrono::Local;
        let now = Local::now().format("%H:%M:%S%.3f");
        let prefix = format!("\x1b[90m[{}]\x1b[0m \x1b[91m[App]\x1b[0m", now);
        println!("{} {}", prefix, format!($($arg)*));
        }
    }};
}
