//! Server-rendered home page

use meteo_core::api::ConfigResponse;
use meteo_core::weather::{DayOutlook, WeatherSnapshot};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;max-width:40rem;margin:2rem auto;padding:0 1rem}\
table{border-collapse:collapse}td{padding:.2rem .8rem .2rem 0}\
.muted{color:#666}";

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

fn outlook_row(out: &mut String, label: &str, day: &DayOutlook) {
    let _ = writeln!(
        out,
        "<tr><td>{}</td><td>{}</td><td>{:.1}°C / {:.1}°C</td></tr>",
        label,
        escape_html(&day.condition),
        day.max_c,
        day.min_c
    );
}

/// Weather summary with the current notification settings
///
/// An empty place renders without a heading location.
pub fn render_weather(snapshot: &WeatherSnapshot, settings: &ConfigResponse) -> String {
    let mut body = String::new();

    if snapshot.place.is_empty() {
        body.push_str("<h1>Weather</h1>\n");
    } else {
        let _ = writeln!(body, "<h1>Weather in {}</h1>", escape_html(&snapshot.place));
    }
    let _ = writeln!(
        body,
        "<p class=\"muted\">Observed {}</p>",
        snapshot.observed_at.format("%H:%M - %d/%m/%Y")
    );

    let current = &snapshot.current;
    let _ = writeln!(body, "<h2>{}</h2>", escape_html(&current.condition));
    body.push_str("<table>\n");
    let _ = writeln!(
        body,
        "<tr><td>Temperature</td><td>{:.1}°C</td></tr>\n\
         <tr><td>Humidity</td><td>{:.0}%</td></tr>\n\
         <tr><td>Wind</td><td>{:.1} km/h</td></tr>\n\
         <tr><td>Visibility</td><td>{:.1} km</td></tr>\n\
         <tr><td>Precipitation</td><td>{:.1} mm</td></tr>",
        current.temperature_c,
        current.humidity_pct,
        current.wind_kmh,
        current.visibility_km,
        current.precipitation_mm
    );
    body.push_str("</table>\n<h2>Outlook</h2>\n<table>\n");
    outlook_row(&mut body, "Today", &snapshot.today);
    outlook_row(&mut body, "Tomorrow", &snapshot.tomorrow);
    body.push_str("</table>\n");

    let _ = writeln!(
        body,
        "<h2>Notifications</h2>\n<p>{}: every {} min between {:02}:00 and {:02}:00</p>",
        if settings.notifications_on {
            "On"
        } else {
            "Off"
        },
        settings.interval_minutes,
        settings.start_hour,
        settings.end_hour
    );

    document("Weather", &body)
}

/// Page shown when no weather could be fetched
pub fn render_error(message: &str) -> String {
    let body = format!(
        "<h1>Weather unavailable</h1>\n<p>{}</p>\n",
        escape_html(message)
    );
    document("Weather unavailable", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use meteo_core::location::Coordinates;
    use meteo_core::weather::CurrentConditions;

    fn snapshot(place: &str) -> WeatherSnapshot {
        let day = DayOutlook {
            max_c: 21.0,
            min_c: 9.5,
            condition: "☁️ Overcast".to_string(),
        };
        WeatherSnapshot {
            place: place.to_string(),
            country: String::new(),
            coordinates: Coordinates { lat: 0.0, lon: 0.0 },
            observed_at: Local::now(),
            current: CurrentConditions {
                condition: "☁️ Overcast".to_string(),
                temperature_c: 14.25,
                humidity_pct: 81.0,
                wind_kmh: 3.0,
                visibility_km: 12.5,
                precipitation_mm: 0.0,
            },
            today: day.clone(),
            tomorrow: day,
        }
    }

    fn settings() -> ConfigResponse {
        ConfigResponse {
            interval_minutes: 15,
            start_hour: 7,
            end_hour: 18,
            notifications_on: true,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
        assert_eq!(escape_html("Milano (MI)"), "Milano (MI)");
    }

    #[test]
    fn test_weather_page_contents() {
        let html = render_weather(&snapshot("Milano (MI), Italia"), &settings());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Weather in Milano (MI), Italia"));
        assert!(html.contains("14.2°C") || html.contains("14.3°C"));
        assert!(html.contains("every 15 min between 07:00 and 18:00"));
    }

    #[test]
    fn test_place_is_escaped() {
        let html = render_weather(&snapshot("<script>"), &settings());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_blank_place_has_plain_heading() {
        let html = render_weather(&snapshot(""), &settings());
        assert!(html.contains("<h1>Weather</h1>"));
    }
}
