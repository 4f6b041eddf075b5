//! Item and asset documents sent to the catalog.

use chrono::NaiveDateTime;
use eoflow_protocol::naming::{asset_title, extension_of, first_integer};
use eoflow_protocol::NamingError;

use crate::api::{AssetPayload, Geometry, ItemPayload, ItemProperties, Link};

const ITEM_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const LICENSE_URL: &str = "https://www.swisstopo.admin.ch/en/home/meta/conditions/geodata.html";
const COPERNICUS_LICENSE_URL: &str = "https://scihub.copernicus.eu/twiki/pub/SciHubWebPortal/TermsConditions/Sentinel_Data_Terms_and_Conditions.pdf";
const GEOCAT_URL: &str = "https://www.geocat.ch/geonetwork/srv/eng/catalog.search#/metadata/";
const MAP_VIEWER_URL: &str = "https://map.geo.admin.ch/index.html";
const WMS_URL: &str = "https://wms.geo.admin.ch/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMediaType {
    Csv,
    Json,
    Jpeg,
    GeoJson,
    Parquet,
    CogTiff,
}

impl AssetMediaType {
    /// Media type by file extension; unknown extensions are rasters.
    pub fn from_name(name: &str) -> Self {
        match extension_of(name).as_str() {
            "csv" => AssetMediaType::Csv,
            "json" => AssetMediaType::Json,
            "jpg" | "jpeg" => AssetMediaType::Jpeg,
            "geojson" => AssetMediaType::GeoJson,
            "parquet" => AssetMediaType::Parquet,
            _ => AssetMediaType::CogTiff,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            AssetMediaType::Csv => "text/csv",
            AssetMediaType::Json => "application/json",
            AssetMediaType::Jpeg => "image/jpeg",
            AssetMediaType::GeoJson => "application/geo+json",
            AssetMediaType::Parquet => "application/vnd.apache.parquet",
            AssetMediaType::CogTiff => "image/tiff; application=geotiff; profile=cloud-optimized",
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, AssetMediaType::CogTiff)
    }
}

/// What an item document is built from.
#[derive(Debug, Clone)]
pub struct ItemSource<'a> {
    /// Prefixed collection id
    pub collection: &'a str,
    /// Collection id without the prefix
    pub short_name: &'a str,
    pub item_id: &'a str,
    pub acquired_at: NaiveDateTime,
    pub host: &'a str,
    pub geocat_id: Option<&'a str>,
}

impl ItemSource<'_> {
    pub fn title(&self) -> String {
        format!("{}_{}", self.short_name, self.item_id)
    }
}

pub fn item_datetime(acquired_at: NaiveDateTime) -> String {
    acquired_at.format(ITEM_DATETIME_FORMAT).to_string()
}

/// Parse a catalog `properties.datetime`, with or without a zone suffix.
pub fn parse_item_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S").ok()
}

pub fn item_payload(source: &ItemSource<'_>, ring: Vec<[f64; 2]>) -> ItemPayload {
    let title = source.title();
    let mut links = vec![
        Link::new("license", LICENSE_URL).titled("Opendata Federal Office of Topography swisstopo"),
        Link::new("license", COPERNICUS_LICENSE_URL).titled(
            "Legal notice on the use of Copernicus Sentinel Data and Service Information",
        ),
        Link::new(
            "visual",
            format!(
                "{MAP_VIEWER_URL}?layers=WMS||{title}||{WMS_URL}?item={}||{}",
                source.item_id, source.collection
            ),
        ),
        Link::new(
            "preview",
            format!(
                "https://{}/{}/{}/thumbnail.jpg",
                source.host, source.collection, source.item_id
            ),
        ),
    ];
    if let Some(geocat_id) = source.geocat_id.filter(|id| !id.is_empty()) {
        links.push(Link::new("describedby", format!("{GEOCAT_URL}{geocat_id}")));
    }

    ItemPayload {
        id: source.item_id.to_string(),
        geometry: Geometry::polygon(ring),
        properties: ItemProperties {
            datetime: item_datetime(source.acquired_at),
            title,
        },
        links,
    }
}

/// Asset metadata. Rasters also carry the projection and ground sample
/// distance (first integer of the title).
pub fn asset_payload(
    asset: &str,
    suffix_markers: &[String],
    current: bool,
    epsg: u32,
) -> Result<AssetPayload, NamingError> {
    let title = asset_title(asset, suffix_markers, current)?;
    let media_type = AssetMediaType::from_name(asset);
    let (proj_epsg, eo_gsd) = if media_type.is_raster() {
        (Some(epsg), first_integer(&title))
    } else {
        (None, None)
    };

    Ok(AssetPayload {
        id: asset.to_string(),
        title,
        media_type: media_type.mime().to_string(),
        proj_epsg,
        eo_gsd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn acquired() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap()
    }

    #[test]
    fn test_media_types() {
        assert_eq!(AssetMediaType::from_name("a.csv").mime(), "text/csv");
        assert_eq!(AssetMediaType::from_name("a.JSON").mime(), "application/json");
        assert_eq!(AssetMediaType::from_name("thumbnail.jpg").mime(), "image/jpeg");
        assert_eq!(
            AssetMediaType::from_name("a.geojson").mime(),
            "application/geo+json"
        );
        assert!(AssetMediaType::from_name("a.tif").is_raster());
        assert!(AssetMediaType::from_name("no_extension").is_raster());
        assert!(!AssetMediaType::from_name("a.parquet").is_raster());
    }

    #[test]
    fn test_item_payload() {
        let source = ItemSource {
            collection: "ch.swisstopo.swisseo_s2-sr_v100",
            short_name: "swisseo_s2-sr_v100",
            item_id: "2024-03-15t235959",
            acquired_at: acquired(),
            host: "data.geo.admin.ch",
            geocat_id: Some("abc-123"),
        };
        let payload = item_payload(&source, vec![[7.0, 46.0]; 5]);

        assert_eq!(payload.id, "2024-03-15t235959");
        assert_eq!(payload.properties.datetime, "2024-03-15T23:59:59Z");
        assert_eq!(payload.properties.title, "swisseo_s2-sr_v100_2024-03-15t235959");
        assert_eq!(payload.geometry.kind, "Polygon");

        let visual = payload.links.iter().find(|l| l.rel == "visual").unwrap();
        assert_eq!(
            visual.href,
            "https://map.geo.admin.ch/index.html?layers=WMS||swisseo_s2-sr_v100_2024-03-15t235959||https://wms.geo.admin.ch/?item=2024-03-15t235959||ch.swisstopo.swisseo_s2-sr_v100"
        );
        let preview = payload.links.iter().find(|l| l.rel == "preview").unwrap();
        assert_eq!(
            preview.href,
            "https://data.geo.admin.ch/ch.swisstopo.swisseo_s2-sr_v100/2024-03-15t235959/thumbnail.jpg"
        );
        assert!(payload.links.iter().any(|l| l.rel == "describedby"));
    }

    #[test]
    fn test_raster_asset_payload() {
        let payload = asset_payload(
            "swisseo_s2-sr_v100_mosaic_2024-03-15t235959_bands-10m.tif",
            &[],
            false,
            2056,
        )
        .unwrap();
        assert_eq!(payload.title, "BANDS-10M");
        assert_eq!(payload.proj_epsg, Some(2056));
        assert_eq!(payload.eo_gsd, Some(10));
    }

    #[test]
    fn test_text_asset_payload() {
        let payload = asset_payload(
            "swisseo_s2-sr_v100_mosaic_2024-03-15t235959_metadata.json",
            &[],
            false,
            2056,
        )
        .unwrap();
        assert_eq!(payload.title, "METADATA");
        assert_eq!(payload.media_type, "application/json");
        assert_eq!(payload.proj_epsg, None);
    }

    #[test]
    fn test_asset_without_date_token_fails() {
        assert!(asset_payload("undated.tif", &[], false, 2056).is_err());
    }

    #[test]
    fn test_parse_item_datetime() {
        assert_eq!(parse_item_datetime("2024-03-15T23:59:59Z"), Some(acquired()));
        assert_eq!(
            parse_item_datetime("2024-03-15T23:59:59+00:00"),
            Some(acquired())
        );
        assert_eq!(parse_item_datetime("yesterday"), None);
    }
}
