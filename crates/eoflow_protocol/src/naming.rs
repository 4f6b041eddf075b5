//! Naming rules shared by export, reconcile and publish.
//!
//! Filenames carry all the state needed to join work across runs:
//!
//! ```text
//! {product}_mosaic_{YYYY-MM-DD}t235959_{descriptor}quadrant{n}
//! \__________________ stem _____________________/\_ tag _/
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{CURRENT_ALIAS_TOKEN, ITEM_TIME_SUFFIX, PARTITION_TAG};
use crate::error::NamingError;

static ISO_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}t\d{6}").expect("valid regex"));
static PARTITION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<stem>.+)quadrant(?P<n>\d+)$").expect("valid regex"));
static EXPORT_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^P:(?P<product>\S+) I:(?P<item>\S+)$").expect("valid regex"));
static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, NamingError> {
    let trimmed = raw.trim();
    if trimmed.len() != 10 {
        return Err(NamingError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| NamingError::InvalidDate(raw.to_string()))
}

/// Item id for a product whose newest scene is `last_scene`.
pub fn item_id_for(last_scene: NaiveDate) -> String {
    format!("{}{}", last_scene.format("%Y-%m-%d"), ITEM_TIME_SUFFIX)
}

/// Base filename of one export, before partition tagging.
pub fn export_base_name(product: &str, item_id: &str, descriptor: &str) -> String {
    format!("{product}_mosaic_{item_id}_{descriptor}").to_lowercase()
}

pub fn partition_filename(base_name: &str, partition: usize) -> String {
    format!("{base_name}{PARTITION_TAG}{partition}")
}

/// Split a partition filename into its group stem and partition number.
///
/// Returns `None` for filenames without a partition tag (gate jobs).
pub fn split_partition(filename: &str) -> Option<(&str, usize)> {
    let caps = PARTITION_SUFFIX.captures(filename)?;
    let stem = caps.name("stem")?.as_str();
    let n = caps.name("n")?.as_str().parse().ok()?;
    Some((stem, n))
}

/// Last path segment of a collection id (`projects/x/assets/S2` -> `S2`).
pub fn collection_basename(collection: &str) -> &str {
    collection
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(collection)
}

/// Description of a gate generation job; also stored as its ledger filename.
pub fn generation_description(collection: &str, date: NaiveDate) -> String {
    format!("{}_{}", collection_basename(collection), date.format("%Y-%m-%d"))
}

pub fn export_description(product: &str, item_id: &str) -> String {
    format!("P:{product} I:{item_id}")
}

/// Recover `(product, item_id)` from an export job description.
pub fn parse_export_description(description: &str) -> Option<(String, String)> {
    let caps = EXPORT_DESCRIPTION.captures(description.trim())?;
    Some((caps["product"].to_string(), caps["item"].to_string()))
}

/// Acquisition timestamp embedded in a filename or item id.
pub fn acquisition_time(name: &str) -> Option<NaiveDateTime> {
    let lowered = name.to_lowercase();
    let token = ISO_TOKEN.find(&lowered)?;
    NaiveDateTime::parse_from_str(token.as_str(), "%Y-%m-%dt%H%M%S").ok()
}

/// Replace the date token with the current alias token.
pub fn current_alias_name(name: &str) -> String {
    ISO_TOKEN.replace(name, CURRENT_ALIAS_TOKEN).into_owned()
}

pub fn with_collection_prefix(collection: &str, prefix: &str) -> String {
    if collection.starts_with(prefix) {
        collection.to_string()
    } else {
        format!("{prefix}{collection}")
    }
}

pub fn strip_collection_prefix<'a>(collection: &'a str, prefix: &str) -> &'a str {
    collection.strip_prefix(prefix).unwrap_or(collection)
}

/// Asset title shown in the catalog.
///
/// Takes the text after the first `_` following the date token (or the
/// `current` token for alias assets), drops the extension and uppercases it.
/// Tabular files whose descriptor contains one of `suffix_markers` keep
/// their extension as a `-EXT` suffix so siblings stay distinguishable.
pub fn asset_title(
    asset: &str,
    suffix_markers: &[String],
    current: bool,
) -> Result<String, NamingError> {
    if asset == "thumbnail.jpg" {
        return Ok("THUMBNAIL".to_string());
    }

    let token_end = if current {
        asset.find(CURRENT_ALIAS_TOKEN).map(|pos| pos + CURRENT_ALIAS_TOKEN.len())
    } else {
        ISO_TOKEN.find(asset).map(|m| m.end())
    }
    .ok_or_else(|| NamingError::MissingDateToken(asset.to_string()))?;

    let after = match asset[token_end..].find('_') {
        Some(offset) => &asset[token_end + offset + 1..],
        None => asset,
    };
    let mut descriptor = match after.rsplit_once('.') {
        Some((head, _)) => head.to_string(),
        None => after.to_string(),
    };

    let extension = extension_of(asset);
    if suffix_markers.iter().any(|m| descriptor.contains(m.as_str()))
        && matches!(extension.as_str(), "csv" | "geojson" | "parquet")
    {
        descriptor.push('-');
        descriptor.push_str(&extension);
    }

    Ok(descriptor.to_uppercase())
}

/// Lowercased file extension without the dot (empty when absent).
pub fn extension_of(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// First run of digits in `text` (ground sample distance in raster titles).
pub fn first_integer(text: &str) -> Option<u32> {
    FIRST_INTEGER.find(text)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["warnregions".to_string()]
    }

    #[test]
    fn test_item_and_base_names() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let item = item_id_for(date);
        assert_eq!(item, "2024-01-10t235959");

        let base = export_base_name("ch.swisstopo.swisseo_s2-sr_v100", &item, "bands-10m");
        assert_eq!(base, "ch.swisstopo.swisseo_s2-sr_v100_mosaic_2024-01-10t235959_bands-10m");

        let part = partition_filename(&base, 3);
        assert_eq!(split_partition(&part), Some((base.as_str(), 3)));
    }

    #[test]
    fn test_gate_rows_have_no_partition() {
        assert_eq!(split_partition("S2_SR_HARMONIZED_SWISS_2024-01-10"), None);
        assert_eq!(split_partition("quadrant1"), None);
    }

    #[test]
    fn test_generation_description_uses_basename() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            generation_description("projects/eo/assets/S2_SR_HARMONIZED_SWISS", date),
            "S2_SR_HARMONIZED_SWISS_2024-01-10"
        );
        assert_eq!(generation_description("S2", date), "S2_2024-01-10");
    }

    #[test]
    fn test_export_description_roundtrip() {
        let desc = export_description("swisseo_s2-sr_v100", "2024-01-10t235959");
        assert_eq!(desc, "P:swisseo_s2-sr_v100 I:2024-01-10t235959");
        assert_eq!(
            parse_export_description(&desc),
            Some(("swisseo_s2-sr_v100".to_string(), "2024-01-10t235959".to_string()))
        );
        assert_eq!(parse_export_description("random text"), None);
    }

    #[test]
    fn test_asset_title_rules() {
        let m = markers();
        assert_eq!(
            asset_title("swisseo_s2-sr_v100_mosaic_2024-01-10t235959_bands-10m.tif", &m, false)
                .unwrap(),
            "BANDS-10M"
        );
        assert_eq!(asset_title("thumbnail.jpg", &m, false).unwrap(), "THUMBNAIL");
        assert_eq!(
            asset_title("swisseo_vhi_v100_2024-01-10t235959_warnregions.csv", &m, false).unwrap(),
            "WARNREGIONS-CSV"
        );
        assert_eq!(
            asset_title("swisseo_vhi_v100_2024-01-10t235959_warnregions.tif", &m, false).unwrap(),
            "WARNREGIONS"
        );
        assert_eq!(
            asset_title("swisseo_vhi_v100_current_forest-10m.tif", &m, true).unwrap(),
            "FOREST-10M"
        );
        assert!(matches!(
            asset_title("no_date_here.tif", &m, false),
            Err(NamingError::MissingDateToken(_))
        ));
    }

    #[test]
    fn test_current_alias_and_acquisition_time() {
        let name = "swisseo_s2-sr_v100_mosaic_2024-01-10t235959_bands-10m.tif";
        assert_eq!(
            current_alias_name(name),
            "swisseo_s2-sr_v100_mosaic_current_bands-10m.tif"
        );
        let ts = acquisition_time(name).unwrap();
        assert_eq!(ts.to_string(), "2024-01-10 23:59:59");
        assert!(acquisition_time("current").is_none());
    }

    #[test]
    fn test_collection_prefix() {
        assert_eq!(
            with_collection_prefix("swisseo_s2-sr_v100", "ch.swisstopo."),
            "ch.swisstopo.swisseo_s2-sr_v100"
        );
        assert_eq!(
            with_collection_prefix("ch.swisstopo.swisseo_s2-sr_v100", "ch.swisstopo."),
            "ch.swisstopo.swisseo_s2-sr_v100"
        );
        assert_eq!(
            strip_collection_prefix("ch.swisstopo.swisseo_s2-sr_v100", "ch.swisstopo."),
            "swisseo_s2-sr_v100"
        );
    }

    #[test]
    fn test_parse_date_strict() {
        assert!(parse_date("2024-01-10").is_ok());
        assert!(parse_date("2024-1-10").is_err());
        assert!(parse_date("10.01.2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_first_integer() {
        assert_eq!(first_integer("BANDS-10M"), Some(10));
        assert_eq!(first_integer("FOREST"), None);
    }
}
