//! Unit conversions, page rendering and the push message format

use alloc::string::String;
use core::fmt::{self, Write};

use serde::Serialize;

use crate::weather::WeatherSnapshot;

/// Pascals per inch of mercury. Kept at the rounded value the station has
/// always displayed; the physical constant is 3386.39.
pub const PASCALS_PER_INHG: f32 = 3386.0;
pub const FEET_PER_METER: f32 = 3.281;

pub const WEATHER_CSS: &str = include_str!("../assets/weather.css");
pub const WEATHER_JS: &str = include_str!("../assets/weather.js");

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn pascals_to_inhg(pressure_pa: u32) -> f32 {
    pressure_pa as f32 / PASCALS_PER_INHG
}

pub fn meters_to_feet(meters: f32) -> f32 {
    meters * FEET_PER_METER
}

/// Render the weather page for one snapshot into `out`.
pub fn render_page(snapshot: &WeatherSnapshot, visits: u32, out: &mut String) -> fmt::Result {
    out.push_str(concat!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">",
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
        "<title>Weather Station</title>",
        "<link rel=\"stylesheet\" href=\"/weather.css\">",
        "</head><body><h1>Weather Station</h1><div class=\"readings\">",
    ));
    write!(
        out,
        "<p id=\"temperature\">Temperature: {:.2} &deg;C, {:.2} &deg;F</p>",
        snapshot.temperature,
        celsius_to_fahrenheit(snapshot.temperature)
    )?;
    write!(
        out,
        "<p id=\"pressure\">Pressure: {} Pa, {:.2} inHg</p>",
        snapshot.pressure,
        pascals_to_inhg(snapshot.pressure)
    )?;
    write!(
        out,
        "<p id=\"altitude\">Altitude: {:.1} m, {:.0} ft</p>",
        snapshot.altitude,
        meters_to_feet(snapshot.altitude)
    )?;
    write!(
        out,
        "<p id=\"heading\">Heading: {} degrees</p>",
        snapshot.heading
    )?;
    write!(
        out,
        "<p id=\"magnetic\">Magnetic field x,y,z: {:.2}, {:.2}, {:.2} mG</p>",
        snapshot.x, snapshot.y, snapshot.z
    )?;
    write!(out, "</div><p class=\"visits\">Visits: {}</p>", visits)?;
    out.push_str("<script src=\"/weather.js\"></script></body></html>");
    Ok(())
}

#[derive(Serialize, Debug)]
struct Temperature {
    c: f32,
    f: f32,
}

#[derive(Serialize, Debug)]
struct Pressure {
    pa: u32,
    inhg: f32,
}

#[derive(Serialize, Debug)]
struct Altitude {
    m: f32,
    ft: f32,
}

#[derive(Serialize, Debug)]
struct Magnetic {
    x: f32,
    y: f32,
    z: f32,
}

/// Body of one push frame. Field order is the wire order.
#[derive(Serialize, Debug)]
pub struct PushMessage {
    temperature: Temperature,
    pressure: Pressure,
    altitude: Altitude,
    heading: i32,
    magnetic: Magnetic,
}

impl From<&WeatherSnapshot> for PushMessage {
    fn from(s: &WeatherSnapshot) -> Self {
        Self {
            temperature: Temperature {
                c: s.temperature,
                f: celsius_to_fahrenheit(s.temperature),
            },
            pressure: Pressure {
                pa: s.pressure,
                inhg: pascals_to_inhg(s.pressure),
            },
            altitude: Altitude {
                m: s.altitude,
                ft: meters_to_feet(s.altitude),
            },
            heading: s.heading,
            magnetic: Magnetic {
                x: s.x,
                y: s.y,
                z: s.z,
            },
        }
    }
}

/// Serialize a snapshot as compact JSON.
pub fn render_push_message(snapshot: &WeatherSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PushMessage::from(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WeatherSnapshot {
        WeatherSnapshot {
            temperature: 25.0,
            pressure: 101_600,
            altitude: 100.0,
            heading: 270,
            x: 1.5,
            y: -2.25,
            z: 4.0,
        }
    }

    #[test]
    fn test_conversions() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
        assert!((meters_to_feet(1000.0) - 3281.0).abs() < 1e-2);
    }

    #[test]
    fn test_inhg_uses_station_constant() {
        assert_eq!(PASCALS_PER_INHG, 3386.0);
        assert_eq!(pascals_to_inhg(3386), 1.0);
        assert!((pascals_to_inhg(101_325) - 29.924).abs() < 1e-3);
    }

    #[test]
    fn test_page_contents() {
        let mut page = String::new();
        render_page(&sample(), 3, &mut page).unwrap();

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("href=\"/weather.css\""));
        assert!(page.contains("src=\"/weather.js\""));
        assert!(page.contains("Temperature: 25.00 &deg;C, 77.00 &deg;F"));
        assert!(page.contains("Pressure: 101600 Pa, 30.01 inHg"));
        assert!(page.contains("Altitude: 100.0 m, 328 ft"));
        assert!(page.contains("Heading: 270 degrees"));
        assert!(page.contains("Magnetic field x,y,z: 1.50, -2.25, 4.00 mG"));
        assert!(page.contains("Visits: 3"));
    }

    #[test]
    fn test_push_message_shape() {
        let json = render_push_message(&sample()).unwrap();
        assert!(!json.contains(' '), "message must be unformatted: {json}");
        let prefix = concat!(
            "{\"temperature\":{\"c\":25.0,\"f\":77.0},",
            "\"pressure\":{\"pa\":101600,",
        );
        assert!(json.starts_with(prefix), "{json}");

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let top: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(top.len(), 5);
        for key in ["temperature", "pressure", "altitude", "heading", "magnetic"] {
            assert!(top.contains(&key), "missing {key}");
        }
        assert_eq!(value["pressure"]["pa"], 101_600);
        assert!((value["pressure"]["inhg"].as_f64().unwrap() - 30.0059).abs() < 1e-3);
        assert!((value["altitude"]["ft"].as_f64().unwrap() - 328.1).abs() < 1e-3);
        assert_eq!(value["heading"], 270);
        assert_eq!(value["magnetic"]["y"], -2.25);
        assert_eq!(value["magnetic"]["z"], 4.0);
    }

    #[test]
    fn test_assets_reference_push_channel() {
        assert!(WEATHER_JS.contains("/ws"));
        assert!(WEATHER_CSS.contains("body"));
    }
}
