//! OGC WMTS 1.0.0 support for the rendered web tiles.
//!
//! Only the RESTful binding is described: tiles are static files laid out by
//! the configured tile path structure, so the capabilities document maps
//! each statistic to a layer with a resource URL template.

pub mod capabilities;

pub use capabilities::{
    mime_type, resource_template, xml_escape, CapabilitiesBuilder, WmtsLayerInfo,
    CAPABILITIES_FILE,
};
