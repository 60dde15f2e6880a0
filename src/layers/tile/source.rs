use crate::core::{
    config::{RowConvention, TileLayerOptions},
    constants::{DEFAULT_SUBDOMAINS, DEFAULT_URL_TEMPLATE},
    geo::TileCoord,
};

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

/// Templated tile URLs such as `https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`.
///
/// Placeholders are replaced literally. `{y}` is flipped for TMS servers and
/// `{s}` cycles through the subdomains by `(x + y + z) % len`.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplateSource {
    template: String,
    subdomains: Vec<String>,
    row_convention: RowConvention,
}

impl UrlTemplateSource {
    pub fn new(
        template: impl Into<String>,
        subdomains: Vec<String>,
        row_convention: RowConvention,
    ) -> Self {
        Self {
            template: template.into(),
            subdomains,
            row_convention,
        }
    }

    pub fn from_options(options: &TileLayerOptions) -> Self {
        Self::new(
            options.url_template.clone(),
            options.subdomains.clone(),
            options.row_convention,
        )
    }

    pub fn openstreetmap() -> Self {
        Self::new(
            DEFAULT_URL_TEMPLATE,
            DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            RowConvention::Xyz,
        )
    }

    fn subdomain(&self, coord: TileCoord) -> &str {
        if self.subdomains.is_empty() {
            return "";
        }
        let sum = coord.x as u64 + coord.y as u64 + coord.z as u64;
        &self.subdomains[(sum % self.subdomains.len() as u64) as usize]
    }

    fn row(&self, coord: TileCoord) -> u32 {
        match self.row_convention {
            RowConvention::Xyz => coord.y,
            RowConvention::Tms => TileCoord::world_size(coord.z) - 1 - coord.y,
        }
    }
}

impl Default for UrlTemplateSource {
    fn default() -> Self {
        Self::openstreetmap()
    }
}

impl TileSource for UrlTemplateSource {
    fn url(&self, coord: TileCoord) -> String {
        self.template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &self.row(coord).to_string())
            .replace("{s}", self.subdomain(coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openstreetmap_url() {
        let source = UrlTemplateSource::openstreetmap();
        // (512 + 341 + 10) % 3 == 2 → "c"
        assert_eq!(
            source.url(TileCoord::new(512, 341, 10)),
            "https://c.tile.openstreetmap.org/10/512/341.png"
        );
    }

    #[test]
    fn test_tms_rows_are_flipped() {
        let source = UrlTemplateSource::new(
            "https://tiles.example.com/{z}/{x}/{y}.jpg",
            Vec::new(),
            RowConvention::Tms,
        );
        assert_eq!(
            source.url(TileCoord::new(3, 1, 3)),
            "https://tiles.example.com/3/3/6.jpg"
        );
        assert_eq!(
            source.url(TileCoord::new(0, 0, 0)),
            "https://tiles.example.com/0/0/0.jpg"
        );
    }

    #[test]
    fn test_template_without_subdomains() {
        let source = UrlTemplateSource::new("test://{z}/{x}/{y}", Vec::new(), RowConvention::Xyz);
        assert_eq!(source.url(TileCoord::new(1, 2, 3)), "test://3/1/2");
    }
}
