/// Normalizes a product model for comparison
///
/// # Normalization Steps
///
/// 1. Fold full-width ASCII (U+FF01..U+FF5E) and the ideographic space to
///    their half-width forms
/// 2. Drop all whitespace, inside the model as well as around it
/// 3. Uppercase
///
/// # Examples
///
/// ```
/// use shelf_scout::matching::normalize_model;
///
/// assert_eq!(normalize_model(" bcd-470 wghtd "), "BCD-470WGHTD");
/// assert_eq!(normalize_model("ＢＣＤ－５０１"), "BCD-501");
/// ```
pub fn normalize_model(model: &str) -> String {
    model
        .chars()
        .map(fold_full_width)
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn fold_full_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

/// Checks whether a scraped model is worth comparing
///
/// A model is valid when, after normalization, it is non-empty, contains at
/// least one ASCII letter or digit, and (when `prefixes` is non-empty)
/// starts with one of the normalized prefixes.
///
/// # Arguments
///
/// * `model` - The model as scraped
/// * `prefixes` - Accepted prefixes for the model's category
pub fn is_valid_model(model: &str, prefixes: &[String]) -> bool {
    let normalized = normalize_model(model);
    if normalized.is_empty() || !normalized.chars().any(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    prefixes.is_empty()
        || prefixes
            .iter()
            .map(|p| normalize_model(p))
            .any(|p| normalized.starts_with(&p))
}
