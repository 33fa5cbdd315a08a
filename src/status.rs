//! Status overlay drawn on top of the image before the single commit.
//!
//! The battery line is drawn on every cycle, whether or not the image was
//! updated, so the device always shows its charge state.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

use crate::config::BatteryConfig;
use crate::panel::{Panel, CHAR_WIDTH, MAX_LEVEL};

/// Distance of the battery line from the bottom edge
pub const BATTERY_LINE_OFFSET: u32 = 25;

/// Margin of the update stamp from the top-right corner
pub const STAMP_MARGIN: u32 = 10;

/// Battery line for a reading, or `None` when nothing should be shown.
///
/// A failed reading is always reported so a dead sensor does not go unnoticed.
pub fn battery_text(reading: Option<f32>, config: &BatteryConfig) -> Option<String> {
    match reading {
        None => Some("Battery level: unknown".to_string()),
        Some(volts) if config.always_show => Some(format!("Battery level: {:.2} V", volts)),
        Some(volts) if volts < config.warning_volts => {
            Some(format!("Battery level low! ({:.2} V)", volts))
        }
        Some(_) => None,
    }
}

/// Draw the battery line in the bottom-left corner, white on black.
///
/// Returns whether anything was drawn.
pub fn draw_battery<P: Panel + ?Sized>(
    panel: &mut P,
    reading: Option<f32>,
    config: &BatteryConfig,
) -> bool {
    let Some(text) = battery_text(reading, config) else {
        return false;
    };
    panel.set_text_color(MAX_LEVEL, 0);
    panel.set_cursor(0, panel.height().saturating_sub(BATTERY_LINE_OFFSET));
    panel.print(&text);
    true
}

/// "Updated 7/23 8:14PM"
pub fn timestamp_text<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("Updated {}", at.format("%-m/%-d %-I:%M%p"))
}

/// Stamp the time of the last image update in the top-right corner.
pub fn draw_timestamp<P, Tz>(panel: &mut P, at: &DateTime<Tz>)
where
    P: Panel + ?Sized,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let text = timestamp_text(at);
    let text_width = text.chars().count() as u32 * CHAR_WIDTH;
    let x = panel.width().saturating_sub(STAMP_MARGIN + text_width);
    panel.set_text_color(0, MAX_LEVEL);
    panel.draw_text(x, STAMP_MARGIN, &text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{GrayFrame, PanelError};
    use chrono::FixedOffset;

    #[derive(Default)]
    struct TextLog {
        cursor: (u32, u32),
        colors: Vec<(u8, u8)>,
        printed: Vec<((u32, u32), String)>,
    }

    impl Panel for TextLog {
        fn width(&self) -> u32 {
            400
        }
        fn height(&self) -> u32 {
            300
        }
        fn set_pixel(&mut self, _x: u32, _y: u32, _value: u8) {}
        fn set_cursor(&mut self, x: u32, y: u32) {
            self.cursor = (x, y);
        }
        fn set_text_color(&mut self, foreground: u8, background: u8) {
            self.colors.push((foreground, background));
        }
        fn print(&mut self, text: &str) {
            self.printed.push((self.cursor, text.to_string()));
        }
        fn commit(&mut self) -> Result<(), PanelError> {
            Ok(())
        }
    }

    #[test]
    fn test_always_show_formats_two_decimals() {
        let config = BatteryConfig::default();
        assert_eq!(
            battery_text(Some(3.9876), &config).as_deref(),
            Some("Battery level: 3.99 V")
        );
    }

    #[test]
    fn test_warning_mode_only_below_threshold() {
        let config = BatteryConfig {
            always_show: false,
            ..BatteryConfig::default()
        };
        assert_eq!(battery_text(Some(4.15), &config), None);
        assert_eq!(
            battery_text(Some(3.6), &config).as_deref(),
            Some("Battery level low! (3.60 V)")
        );
    }

    #[test]
    fn test_failed_reading_is_always_shown() {
        let config = BatteryConfig {
            always_show: false,
            ..BatteryConfig::default()
        };
        assert_eq!(
            battery_text(None, &config).as_deref(),
            Some("Battery level: unknown")
        );
    }

    #[test]
    fn test_battery_line_position_and_color() {
        let mut panel = TextLog::default();
        assert!(draw_battery(&mut panel, Some(4.0), &BatteryConfig::default()));
        assert_eq!(panel.colors, vec![(7, 0)]);
        assert_eq!(panel.printed, vec![((0, 275), "Battery level: 4.00 V".to_string())]);
    }

    #[test]
    fn test_timestamp_format_and_position() {
        let at = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 7, 23, 20, 14, 0)
            .unwrap();
        assert_eq!(timestamp_text(&at), "Updated 7/23 8:14PM");

        let mut panel = TextLog::default();
        draw_timestamp(&mut panel, &at);
        let expected_x = 400 - 10 - 19 * CHAR_WIDTH;
        assert_eq!(panel.printed, vec![((expected_x, 10), "Updated 7/23 8:14PM".to_string())]);
    }

    #[test]
    fn test_battery_text_lands_in_framebuffer() {
        let mut frame = GrayFrame::try_new(300, 60).unwrap();
        draw_battery(&mut frame, Some(4.2), &BatteryConfig::default());
        let painted = (0..300)
            .flat_map(|x| (35..55).map(move |y| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y) == Some(0))
            .count();
        assert!(painted > 0);
    }
}
