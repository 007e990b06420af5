//! Topic names the bundled plugins agree on by convention. The bus itself
//! treats these as opaque strings.

pub const DISCOVERY: &str = "discovery.topic";
pub const COLLECTOR: &str = "collector.topic";
pub const DETECTOR: &str = "detector.topic";
