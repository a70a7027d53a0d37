//! Self-contained Leaflet document for one city's markers.

use base64::Engine;
use leak_client::domain::{timestamp, Measurement, Photo};
use serde::Serialize;

const LEAFLET_VERSION: &str = "1.9.4";
const LEAK_COLOR: &str = "#d62728";
const NO_LEAK_COLOR: &str = "#2ca02c";
const THUMBNAIL_SIZE: u32 = 100;

#[derive(Debug, Serialize)]
struct Marker {
    lat: f64,
    lon: f64,
    leak: bool,
    color: &'static str,
    popup: String,
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Best-effort image type from the leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

fn popup_html(m: &Measurement, photo: Option<&Photo>) -> String {
    let mut html = format!(
        "<b>Methane reading:</b> ~{} ppm<br><b>Date/Time:</b> {}<br><b>Infrastructure:</b> {}<br><b>Volunteer:</b> {}",
        m.methane_level,
        escape_html(&timestamp::to_storage(m.timestamp)),
        escape_html(m.infrastructure_type.as_deref().unwrap_or("unknown")),
        escape_html(&m.volunteer),
    );
    if let Some(photo) = photo {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&photo.photo);
        html.push_str(&format!(
            "<br><img src=\"data:{};base64,{}\" width=\"{THUMBNAIL_SIZE}\" height=\"{THUMBNAIL_SIZE}\">",
            sniff_mime(&photo.photo),
            encoded
        ));
    }
    html
}

/// Render the page. `measurements` must be non-empty and in display order;
/// `photos` is looked up by the measurement's `photo_id`.
pub fn render_document<'a>(
    city: &str,
    measurements: &[Measurement],
    photo_for: impl Fn(&Measurement) -> Option<&'a Photo>,
    generated_at: &str,
) -> String {
    let markers: Vec<Marker> = measurements
        .iter()
        .map(|m| Marker {
            lat: m.latitude,
            lon: m.longitude,
            leak: m.leak,
            color: if m.leak { LEAK_COLOR } else { NO_LEAK_COLOR },
            popup: popup_html(m, photo_for(m)),
        })
        .collect();

    let n = measurements.len().max(1) as f64;
    let center_lat = measurements.iter().map(|m| m.latitude).sum::<f64>() / n;
    let center_lon = measurements.iter().map(|m| m.longitude).sum::<f64>() / n;

    // Serializing a Vec of plain structs cannot fail; fall back to an empty list regardless.
    let data = serde_json::to_string_pretty(&markers)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/");
    let title = escape_html(city);

    format!(
        r#"<!DOCTYPE html>
<!-- generated {generated_at} -->
<html>
<head>
<meta charset="utf-8">
<title>Methane survey: {title}</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@{LEAFLET_VERSION}/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
const markers = {data};
const map = L.map("map").setView([{center_lat}, {center_lon}], 13);
L.tileLayer("https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
  maxZoom: 19,
  attribution: "&copy; OpenStreetMap contributors"
}}).addTo(map);
const leakLayer = L.layerGroup().addTo(map);
const noLeakLayer = L.layerGroup().addTo(map);
for (const m of markers) {{
  L.circleMarker([m.lat, m.lon], {{ radius: 8, color: m.color, fillColor: m.color, fillOpacity: 0.8 }})
    .bindPopup(m.popup, {{ maxWidth: 300 }})
    .addTo(m.leak ? leakLayer : noLeakLayer);
}}
L.control.layers(null, {{ "Leak detected": leakLayer, "No leak": noLeakLayer }}, {{ collapsed: false }}).addTo(map);
map.fitBounds(markers.map(m => [m.lat, m.lon]), {{ padding: [20, 20], maxZoom: 17 }});
</script>
</body>
</html>
"#
    )
}
