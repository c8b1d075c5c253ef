/// Replaces characters that are illegal in file names on common platforms with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// Parses `HH:MM:SS` or `MM:SS` into whole seconds.
/// Anything else, including an empty string, means "no timestamp".
pub fn parse_timestamp(input: &str) -> Option<u64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let parts = input
        .split(':')
        .map(|p| p.trim().parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return None,
    };
    // Overflowing input is as malformed as any other
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)
}

/// `H:MM:SS` or `M:SS` for a duration in seconds
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Cheap check used to decide whether a pasted URL should be fetched automatically.
/// An explicit "Load" always fetches regardless.
pub fn looks_like_video_url(url: &str) -> bool {
    let url = url.trim();
    ["youtube.com/", "youtu.be/", "youtube-nocookie.com/"]
        .iter()
        .any(|host| url.contains(host))
}

/// Opens `folder` in the platform file manager without blocking the UI.
pub fn open_folder(folder: std::path::PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";

        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            log::warn!("Could not open {}: {}", folder.display(), e);
        }
    });
}
