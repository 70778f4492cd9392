//! Test data builders for region images and tile settings

use hwinfo_deck::config::TileSettings;
use hwinfo_deck::hwinfo::image::RegionImageBuilder;
use hwinfo_deck::types::{sensor_uid, ReadingType};

pub const CPU_SENSOR_ID: u32 = 0xF000_0100;
pub const GPU_SENSOR_ID: u32 = 0xE000_0200;

pub fn cpu_uid() -> String {
    sensor_uid(CPU_SENSOR_ID, 0)
}

pub fn gpu_uid() -> String {
    sensor_uid(GPU_SENSOR_ID, 0)
}

/// A small desktop: one CPU sensor and one GPU sensor
///
/// | sensor | id | type        | unit | value        |
/// |--------|----|-------------|------|--------------|
/// | CPU    | 1  | temperature | °C   | `cpu_temp`   |
/// | CPU    | 2  | usage       | %    | 37.5         |
/// | CPU    | 3  | power       | W    | 65.2         |
/// | GPU    | 1  | clock       | MHz  | 1950.0       |
/// | GPU    | 2  | other       | MB   | 1234567.0    |
pub fn desktop_region(cpu_temp: f64) -> RegionImageBuilder {
    let mut builder = RegionImageBuilder::new().poll_time(1_700_000_000);
    let cpu = builder.sensor(CPU_SENSOR_ID, 0, "CPU [#0]: AMD Ryzen 7 5800X");
    builder.reading(cpu, 1, ReadingType::Temperature, "CPU (Tctl/Tdie)", "°C", cpu_temp);
    builder.reading(cpu, 2, ReadingType::Usage, "Total CPU Usage", "%", 37.5);
    builder.reading(cpu, 3, ReadingType::Power, "CPU Package Power", "W", 65.2);
    let gpu = builder.sensor(GPU_SENSOR_ID, 0, "GPU [#0]: NVIDIA GeForce RTX 3080");
    builder.reading(gpu, 1, ReadingType::Clock, "GPU Clock", "MHz", 1950.0);
    builder.reading(gpu, 2, ReadingType::Other, "GPU Memory Allocated", "MB", 1234567.0);
    builder
}

/// Builder for tile settings
#[derive(Default)]
pub struct TileSettingsBuilder {
    settings: TileSettings,
}

impl TileSettingsBuilder {
    pub fn new(sensor_uid: &str, reading_id: u32) -> Self {
        Self {
            settings: TileSettings {
                sensor_uid: Some(sensor_uid.to_string()),
                reading_id: Some(reading_id),
                ..Default::default()
            },
        }
    }

    pub fn divisor(mut self, divisor: &str) -> Self {
        self.settings.divisor = Some(divisor.to_string());
        self
    }

    pub fn format(mut self, format: &str) -> Self {
        self.settings.format = Some(format.to_string());
        self
    }

    pub fn in_error_state(mut self) -> Self {
        self.settings.in_error_state = true;
        self
    }

    pub fn build(self) -> TileSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_region_decodes() {
        let snapshot = hwinfo_deck::hwinfo::decode(&desktop_region(50.0).build()).unwrap();
        assert_eq!(snapshot.sensors.len(), 2);
        assert_eq!(snapshot.reading_count(), 5);
    }

    #[test]
    fn test_tile_settings_builder() {
        let settings = TileSettingsBuilder::new("1-0", 3)
            .divisor("1000")
            .format("%.1f")
            .build();

        assert_eq!(settings.target(), Some(("1-0", 3)));
        assert_eq!(settings.divisor.as_deref(), Some("1000"));
        assert!(!settings.in_error_state);
    }
}
