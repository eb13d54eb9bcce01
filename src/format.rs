use std::path::Path;

/// File format, told by the extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Json,

    /// Semicolon-separated for the input, comma-separated for the output.
    Csv,
}

impl Format {
    /// CSV for `*.csv`, JSON for anything else.
    pub fn of(path: &Path) -> Self {
        if path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("csv")) {
            Self::Csv
        } else {
            Self::Json
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of() {
        assert_eq!(Format::of(Path::new("prices.csv")), Format::Csv);
        assert_eq!(Format::of(Path::new("Energy_prices_2023.CSV")), Format::Csv);
        assert_eq!(Format::of(Path::new("prices.json")), Format::Json);
        assert_eq!(Format::of(Path::new("prices")), Format::Json);
    }
}
