//! WMTS GetCapabilities document generation.
//!
//! The document is assembled with `format!` templates. Every
//! user-provided string goes through [`xml_escape`].

use pyramid_common::{BoundingBox, PyramidError, PyramidResult, TileMatrixSet, TilingConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of the capabilities document, relative to the tile base URL.
pub const CAPABILITIES_FILE: &str = "WMTSCapabilities.xml";

/// One WMTS layer (a rendered statistic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmtsLayerInfo {
    pub identifier: String,
    pub title: String,
    /// Extent in longitude/latitude degrees.
    pub bounding_box: BoundingBox,
}

/// Builds a capabilities document for static web tiles.
#[derive(Debug, Clone)]
pub struct CapabilitiesBuilder {
    pub title: String,
    /// URL the web tile directory is served from, without trailing slash.
    pub base_url: String,
    pub layers: Vec<WmtsLayerInfo>,
    pub tile_matrix_set: TileMatrixSet,
    /// Highest zoom level advertised. Levels missing from the matrix set
    /// are left out.
    pub max_zoom: u32,
    /// Tile size in pixels as `(rows, cols)`.
    pub tile_size: (usize, usize),
    pub path_structure: Vec<String>,
    pub extension: String,
}

impl CapabilitiesBuilder {
    /// One layer per configured statistic, all sharing `bounds`
    /// (longitude/latitude).
    pub fn from_config(
        config: &TilingConfig,
        title: impl Into<String>,
        base_url: impl Into<String>,
        bounds: BoundingBox,
    ) -> PyramidResult<Self> {
        let tile_matrix_set = TileMatrixSet::from_id(&config.tms_id)?;
        if tile_matrix_set
            .get_matrix_by_zoom(config.max_zoom())
            .is_none()
        {
            return Err(PyramidError::configuration(format!(
                "tile matrix set {} has no zoom level {}",
                tile_matrix_set.identifier,
                config.max_zoom()
            )));
        }

        let layers = config
            .statistics
            .iter()
            .map(|stat| WmtsLayerInfo {
                identifier: stat.name.clone(),
                title: stat.name.clone(),
                bounding_box: bounds,
            })
            .collect();

        Ok(Self {
            title: title.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            layers,
            tile_matrix_set,
            max_zoom: config.max_zoom(),
            tile_size: config.tile_size,
            path_structure: config.tile_path_structure.clone(),
            extension: config.web_tiles_type.clone(),
        })
    }

    pub fn capabilities_url(&self) -> String {
        format!("{}/{}", self.base_url, CAPABILITIES_FILE)
    }

    /// Scale denominator of zoom `z` for this builder's tile width.
    pub fn scale_denominator(&self, z: u32) -> Option<f64> {
        let matrix = self.tile_matrix_set.get_matrix_by_zoom(z)?;
        let width = self.tile_size.1.max(1) as f64;
        Some(matrix.scale_denominator * matrix.tile_width as f64 / width)
    }

    /// Render the full capabilities document.
    pub fn build(&self) -> String {
        let layers = self
            .layers
            .iter()
            .map(|layer| self.layer_xml(layer))
            .collect::<Vec<_>>()
            .join("\n");

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0"
    xmlns:ows="http://www.opengis.net/ows/1.1"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    xmlns:gml="http://www.opengis.net/gml"
    xsi:schemaLocation="http://www.opengis.net/wmts/1.0 http://schemas.opengis.net/wmts/1.0/wmtsGetCapabilities_response.xsd"
    version="1.0.0">
  <ows:ServiceIdentification>
    <ows:Title>{title}</ows:Title>
    <ows:ServiceType>OGC WMTS</ows:ServiceType>
    <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <ows:OperationsMetadata>
{get_capabilities}
{get_tile}
  </ows:OperationsMetadata>
  <Contents>
{layers}
{tile_matrix_set}
  </Contents>
  <ServiceMetadataURL xlink:href="{capabilities_url}"/>
</Capabilities>
"#,
            title = xml_escape(&self.title),
            get_capabilities = operation_xml("GetCapabilities", &self.capabilities_url()),
            get_tile = operation_xml("GetTile", &format!("{}/", self.base_url)),
            layers = layers,
            tile_matrix_set = self.tile_matrix_set_xml(),
            capabilities_url = xml_escape(&self.capabilities_url()),
        );

        debug!(
            layers = self.layers.len(),
            max_zoom = self.max_zoom,
            bytes = xml.len(),
            "Built WMTS capabilities"
        );
        xml
    }

    fn layer_xml(&self, layer: &WmtsLayerInfo) -> String {
        let bbox = &layer.bounding_box;
        let format = mime_type(&self.extension);
        let template = resource_template(
            &self.base_url,
            &self.path_structure,
            &layer.identifier,
            &self.extension,
        );

        format!(
            r#"    <Layer>
      <ows:Title>{}</ows:Title>
      <ows:Identifier>{}</ows:Identifier>
      <ows:WGS84BoundingBox>
        <ows:LowerCorner>{} {}</ows:LowerCorner>
        <ows:UpperCorner>{} {}</ows:UpperCorner>
      </ows:WGS84BoundingBox>
      <Style isDefault="true">
        <ows:Title>Default Style</ows:Title>
        <ows:Identifier>default</ows:Identifier>
      </Style>
      <Format>{}</Format>
      <TileMatrixSetLink>
        <TileMatrixSet>{}</TileMatrixSet>
      </TileMatrixSetLink>
      <ResourceURL format="{}" resourceType="tile" template="{}"/>
    </Layer>"#,
            xml_escape(&layer.title),
            xml_escape(&layer.identifier),
            bbox.left(),
            bbox.bottom(),
            bbox.right(),
            bbox.top(),
            format,
            xml_escape(&self.tile_matrix_set.identifier),
            format,
            xml_escape(&template),
        )
    }

    fn tile_matrix_set_xml(&self) -> String {
        let tms = &self.tile_matrix_set;
        let (rows, cols) = self.tile_size;

        let matrices = (0..=self.max_zoom)
            .filter_map(|z| {
                let matrix = tms.get_matrix_by_zoom(z)?;
                let scale = self.scale_denominator(z)?;
                Some(format!(
                    r#"      <TileMatrix>
        <ows:Identifier>{}</ows:Identifier>
        <ScaleDenominator>{}</ScaleDenominator>
        <TopLeftCorner>{} {}</TopLeftCorner>
        <TileWidth>{}</TileWidth>
        <TileHeight>{}</TileHeight>
        <MatrixWidth>{}</MatrixWidth>
        <MatrixHeight>{}</MatrixHeight>
      </TileMatrix>"#,
                    xml_escape(&matrix.identifier),
                    scale,
                    matrix.top_left_corner.0,
                    matrix.top_left_corner.1,
                    cols,
                    rows,
                    matrix.matrix_width,
                    matrix.matrix_height,
                ))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let well_known = tms
            .well_known_scale_set
            .as_ref()
            .map(|wkss| {
                format!(
                    "      <WellKnownScaleSet>{}</WellKnownScaleSet>\n",
                    xml_escape(wkss)
                )
            })
            .unwrap_or_default();

        let bbox = &tms.bounding_box;
        format!(
            r#"    <TileMatrixSet>
      <ows:Identifier>{id}</ows:Identifier>
      <ows:BoundingBox crs="{crs}">
        <ows:LowerCorner>{} {}</ows:LowerCorner>
        <ows:UpperCorner>{} {}</ows:UpperCorner>
      </ows:BoundingBox>
      <ows:SupportedCRS>{crs}</ows:SupportedCRS>
{well_known}{matrices}
    </TileMatrixSet>"#,
            bbox.left(),
            bbox.bottom(),
            bbox.right(),
            bbox.top(),
            id = xml_escape(&tms.identifier),
            crs = xml_escape(&tms.crs_uri),
            well_known = well_known,
            matrices = matrices,
        )
    }
}

fn operation_xml(name: &str, href: &str) -> String {
    format!(
        r#"    <ows:Operation name="{}">
      <ows:DCP>
        <ows:HTTP>
          <ows:Get xlink:href="{}">
            <ows:Constraint name="GetEncoding">
              <ows:AllowedValues><ows:Value>RESTful</ows:Value></ows:AllowedValues>
            </ows:Constraint>
          </ows:Get>
        </ows:HTTP>
      </ows:DCP>
    </ows:Operation>"#,
        name,
        xml_escape(href)
    )
}

/// RESTful URL template for `layer`, following the tile path structure.
///
/// `tms`, `z`, `x` and `y` become the `{TileMatrixSet}`, `{TileMatrix}`,
/// `{TileCol}` and `{TileRow}` placeholders; `stat`/`style` becomes the
/// layer identifier.
pub fn resource_template(
    base_url: &str,
    structure: &[String],
    layer: &str,
    extension: &str,
) -> String {
    let path = structure
        .iter()
        .map(|component| match component.as_str() {
            "tms" => "{TileMatrixSet}",
            "z" => "{TileMatrix}",
            "x" => "{TileCol}",
            "y" => "{TileRow}",
            "stat" | "style" => layer,
            literal => literal,
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}{}", base_url.trim_end_matches('/'), path, extension)
}

/// MIME type for a web tile extension such as `.png`.
pub fn mime_type(extension: &str) -> &'static str {
    match extension
        .trim_start_matches('.')
        .to_ascii_lowercase()
        .as_str()
    {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Escape text for XML element content and attribute values.
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
