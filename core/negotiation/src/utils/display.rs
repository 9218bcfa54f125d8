use std::fmt::Display;

/// Renders optional fields in log lines without unwrapping them.
pub fn opt<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_options() {
        assert_eq!("17", opt(&Some(17)));
        assert_eq!("None", opt::<u32>(&None));
    }
}
