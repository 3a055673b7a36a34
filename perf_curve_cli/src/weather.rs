//! Observation-derived inputs: pressure altitude and ISA deviation.

/// Standard sea-level pressure (hPa).
pub const STANDARD_QNH_HPA: f64 = 1013.25;

/// Pressure altitude (ft) of a field at `elevation_ft` under `qnh_hpa`.
pub fn pressure_altitude(qnh_hpa: f64, elevation_ft: f64) -> f64 {
    elevation_ft + 145_366.45 * (1.0 - (qnh_hpa / STANDARD_QNH_HPA).powf(0.190_284))
}

/// ISA temperature (°C) at a pressure altitude, 1.98 °C per 1000 ft lapse.
pub fn isa_temperature(pressure_altitude_ft: f64) -> f64 {
    15.0 - 1.98 * pressure_altitude_ft / 1000.0
}

pub fn isa_deviation(temperature_c: f64, pressure_altitude_ft: f64) -> f64 {
    temperature_c - isa_temperature(pressure_altitude_ft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pressure_gives_field_elevation() {
        assert_eq!(pressure_altitude(STANDARD_QNH_HPA, 0.0), 0.0);
        assert_eq!(pressure_altitude(STANDARD_QNH_HPA, 2500.0), 2500.0);
    }

    #[test]
    fn test_low_pressure_raises_pressure_altitude() {
        // Roughly 27 ft per hPa near sea level.
        let zp = pressure_altitude(1000.0, 0.0);
        assert!((zp - 363.6).abs() < 0.5, "{zp}");
        assert!(pressure_altitude(1030.0, 1000.0) < 1000.0);
    }

    #[test]
    fn test_isa_deviation() {
        assert_eq!(isa_deviation(15.0, 0.0), 0.0);
        assert!((isa_deviation(5.0, 5000.0) - -0.1).abs() < 1e-9);
        assert!((isa_deviation(30.0, 1000.0) - 16.98).abs() < 1e-9);
    }
}
