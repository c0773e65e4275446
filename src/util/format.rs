pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} PB", value)
}

pub fn human_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1} s", seconds);
    }
    let total = seconds as u64;
    if total < 3600 {
        return format!("{} min {} s", total / 60, total % 60);
    }
    format!("{} h {} min", total / 3600, (total % 3600) / 60)
}
