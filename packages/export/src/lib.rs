// ABOUTME: Snapshot export of a topology response in five formats
// ABOUTME: JSON and CSV for data, DOT for graphs, PNG/SVG via Graphviz

pub mod csv;
pub mod dot;
pub mod error;
pub mod json;
pub mod model;
pub mod render;

pub use csv::export_csv;
pub use dot::{export_dot, DotOptions};
pub use error::{ExportError, ExportResult};
pub use json::export_json;
pub use model::{export_filename, ExportData, ExportEdge, ExportNode};
pub use render::{graphviz_available, render_dot};
