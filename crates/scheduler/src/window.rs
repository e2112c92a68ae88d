//! Safe-window math over minutes from local midnight.

/// Whether a minute of the day falls inside any window. Bounds are
/// inclusive.
pub fn in_window(minute_of_day: u32, windows: &[(u32, u32)]) -> bool {
    windows
        .iter()
        .any(|(start, end)| minute_of_day >= *start && minute_of_day <= *end)
}

/// The next window at or after the given minute, wrapping to the first
/// window of the next day, plus the minutes until it opens.
pub fn next_window(minute_of_day: u32, windows: &[(u32, u32)]) -> (u32, u32, u32) {
    let Some(first) = windows.first() else {
        return (0, 0, 0);
    };

    for (start, end) in windows {
        if minute_of_day <= *start {
            return (*start, *end, start - minute_of_day);
        }
    }
    // Wrap to tomorrow's first window.
    (first.0, first.1, 1440 - minute_of_day + first.0)
}
