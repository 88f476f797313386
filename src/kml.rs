//! # KML Document Module
//!
//! Turns a fetched node list into a KML document that ATAK and Google Earth
//! can load directly.
//!
//! ## Layout
//! ```text
//! kml
//! └── Document
//!     ├── name
//!     ├── Style#repeaterStyle     shared balloon template
//!     └── Placemark*              one per visible node with a position
//!         ├── name, description, styleUrl
//!         ├── Style/IconStyle     marker coloured by DisplayStatus
//!         ├── ExtendedData        lastReport, keyed
//!         └── Point/coordinates   "<lon>,<lat>,0"
//! ```
//!
//! Building is pure. Rendering happens once per refresh, before the
//! document is published to the store.
use crate::source::NodeRecord;
use crate::status::{classify, DisplayStatus};
use chrono::{DateTime, Utc};
use std::fmt;

pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
pub const KML_CONTENT_TYPE: &str = "application/vnd.google-earth.kml+xml";
pub const STYLE_ID: &str = "repeaterStyle";
pub const DEFAULT_DOCUMENT_NAME: &str = "NGGMRS Repeater Status";

const ICON_SCALE: &str = "1.2";

const BALLOON_TEMPLATE: &str = "
<b>$[name]</b><br/>
Frequency: $[description]<br/>
Last report: $[lastReport]<br/>
Keyed: $[keyed]<br/>
";

#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    pub name: String,
    pub description: String,
    pub status: DisplayStatus,
    pub last_report: i64,
    pub keyed: bool,
    pub longitude: f64,
    pub latitude: f64,
}

impl Placemark {
    pub fn icon_href(&self) -> &'static str {
        self.status.icon_href()
    }

    pub fn last_report_text(&self) -> String {
        format_report_time(self.last_report)
    }

    pub fn keyed_text(&self) -> &'static str {
        if self.keyed {
            "Yes"
        } else {
            "No"
        }
    }

    /// `<lon>,<lat>,0`. Whole degrees keep their `.0` (`-105.0`, not `-105`).
    pub fn coordinates_text(&self) -> String {
        format!("{:?},{:?},0", self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoDocument {
    pub name: String,
    pub placemarks: Vec<Placemark>,
}

impl GeoDocument {
    pub fn len(&self) -> usize {
        self.placemarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placemarks.is_empty()
    }

    /// Full KML text including the XML declaration.
    pub fn to_kml(&self) -> String {
        self.to_string()
    }
}

/// `YYYY-MM-DD HH:MM:SS UTC`. Out of range timestamps render as the epoch.
pub fn format_report_time(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

pub struct DocumentBuilder {
    name: String,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        DocumentBuilder::new(DEFAULT_DOCUMENT_NAME)
    }
}

impl DocumentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DocumentBuilder { name: name.into() }
    }

    /// One placemark per record that is not hidden and has both coordinates,
    /// in input order.
    pub fn build(&self, records: &[NodeRecord], now: DateTime<Utc>) -> GeoDocument {
        let placemarks = records
            .iter()
            .filter(|record| !record.hidden)
            .filter_map(|record| {
                let (longitude, latitude) = record.coordinates()?;
                Some(Placemark {
                    name: record.name.clone().unwrap_or_else(|| "Unnamed".to_string()),
                    description: record.description.clone().unwrap_or_default(),
                    status: classify(&record.keyed, record.last_report, now),
                    last_report: record.last_report,
                    keyed: record.is_keyed(),
                    longitude,
                    latitude,
                })
            })
            .collect();

        GeoDocument {
            name: self.name.clone(),
            placemarks,
        }
    }
}

/// Builds with the default document name.
pub fn build(records: &[NodeRecord], now: DateTime<Utc>) -> GeoDocument {
    DocumentBuilder::default().build(records, now)
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&apos;")?,
                c => fmt::Write::write_char(f, c)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Placemark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    <Placemark>")?;
        writeln!(f, "      <name>{}</name>", Escaped(&self.name))?;
        writeln!(f, "      <description>{}</description>", Escaped(&self.description))?;
        writeln!(f, "      <styleUrl>#{}</styleUrl>", STYLE_ID)?;
        writeln!(f, "      <Style>")?;
        writeln!(f, "        <IconStyle>")?;
        writeln!(f, "          <scale>{}</scale>", ICON_SCALE)?;
        writeln!(f, "          <Icon>")?;
        writeln!(f, "            <href>{}</href>", Escaped(self.icon_href()))?;
        writeln!(f, "          </Icon>")?;
        writeln!(f, "        </IconStyle>")?;
        writeln!(f, "      </Style>")?;
        writeln!(f, "      <ExtendedData>")?;
        writeln!(
            f,
            "        <Data name=\"lastReport\"><value>{}</value></Data>",
            self.last_report_text()
        )?;
        writeln!(
            f,
            "        <Data name=\"keyed\"><value>{}</value></Data>",
            self.keyed_text()
        )?;
        writeln!(f, "      </ExtendedData>")?;
        writeln!(f, "      <Point>")?;
        writeln!(f, "        <coordinates>{}</coordinates>", self.coordinates_text())?;
        writeln!(f, "      </Point>")?;
        writeln!(f, "    </Placemark>")
    }
}

impl fmt::Display for GeoDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<?xml version='1.0' encoding='utf-8'?>")?;
        writeln!(f, "<kml xmlns=\"{}\">", KML_NAMESPACE)?;
        writeln!(f, "  <Document>")?;
        writeln!(f, "    <name>{}</name>", Escaped(&self.name))?;
        writeln!(f, "    <Style id=\"{}\">", STYLE_ID)?;
        writeln!(f, "      <BalloonStyle>")?;
        writeln!(f, "        <bgColor>ffffffff</bgColor>")?;
        writeln!(f, "        <textColor>ff000000</textColor>")?;
        writeln!(f, "        <text><![CDATA[{}]]></text>", BALLOON_TEMPLATE)?;
        writeln!(f, "      </BalloonStyle>")?;
        writeln!(f, "    </Style>")?;
        for placemark in &self.placemarks {
            write!(f, "{}", placemark)?;
        }
        writeln!(f, "  </Document>")?;
        writeln!(f, "</kml>")
    }
}
