use std::collections::HashMap;

use lazy_static::lazy_static;

/// Retail identity of a known WiZ module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductInfo {
    pub product_name: &'static str,
    pub image_url: &'static str,
}

lazy_static! {
    /// Module names seen in the wild, mapped to their retail products.
    /// Lookup misses are normal; devices without an entry keep working,
    /// they just stay nameless.
    static ref PRODUCT_LIBRARY: HashMap<&'static str, ProductInfo> = {
        let mut library = HashMap::new();
        library.insert(
            "ESP03_SHRGB3_01ABI",
            ProductInfo {
                product_name: "WRGB LED Strip",
                image_url: "https://www.assets.signify.com/is/image/Signify/WiFi-BLE-LEDstrip-2M-1600lm-startkit-SPP?wid=200&hei=200&qlt=100",
            },
        );
        library.insert(
            "ESP15_SHTW1C_01",
            ProductInfo {
                product_name: "Tunable White Bulb",
                image_url: "https://www.assets.signify.com/is/image/PhilipsLighting/929002383532-?",
            },
        );
        library.insert(
            "ESP01_SHRGB1C_31",
            ProductInfo {
                product_name: "RGB Bulb A19",
                image_url: "https://www.assets.signify.com/is/image/Signify/046677603548-?",
            },
        );
        library.insert(
            "ESP01_SHRGBC_01",
            ProductInfo {
                product_name: "RGB Bulb",
                image_url: "https://www.assets.signify.com/is/image/Signify/046677603548-?",
            },
        );
        library.insert(
            "ESP56_SHTW3_01",
            ProductInfo {
                product_name: "Tunable White BR30",
                image_url: "https://www.assets.signify.com/is/image/PhilipsLighting/929002383532-?",
            },
        );
        library.insert(
            "ESP17_SHTW9_01",
            ProductInfo {
                product_name: "Tunable White A21",
                image_url: "https://www.assets.signify.com/is/image/PhilipsLighting/929002383532-?",
            },
        );
        library.insert(
            "ESP03_SHRGB1W_01",
            ProductInfo {
                product_name: "RGBW Bulb",
                image_url: "https://www.assets.signify.com/is/image/Signify/046677603548-?",
            },
        );
        library
    };
}

/// Looks up the retail product for a reported module name.
pub fn product_for(module_name: &str) -> Option<&'static ProductInfo> {
    PRODUCT_LIBRARY.get(module_name)
}

/// Capability flags derived from a module name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub rgb: bool,
    pub tunable_white: bool,
}

impl Capabilities {
    /// Substring heuristic over the module name: `RGB` and `TW` markers.
    ///
    /// Module names carrying neither marker are treated as plain RGB.
    /// This is inherited device-naming lore, not derived from the protocol;
    /// the name is the only capability signal the devices expose.
    pub fn from_module_name(module_name: &str) -> Self {
        let rgb = module_name.contains("RGB");
        let tunable_white = module_name.contains("TW");
        if !rgb && !tunable_white {
            return Capabilities {
                rgb: true,
                tunable_white: false,
            };
        }
        Capabilities { rgb, tunable_white }
    }

    /// Devices that can only vary color temperature, never full RGB.
    pub fn tunable_white_only(&self) -> bool {
        self.tunable_white && !self.rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_modules_are_detected() {
        let caps = Capabilities::from_module_name("ESP01_SHRGB1C_31");
        assert!(caps.rgb);
        assert!(!caps.tunable_white);
        assert!(!caps.tunable_white_only());
    }

    #[test]
    fn tunable_white_modules_are_detected() {
        let caps = Capabilities::from_module_name("ESP15_SHTW1C_01");
        assert!(caps.tunable_white);
        assert!(!caps.rgb);
        assert!(caps.tunable_white_only());
    }

    #[test]
    fn unknown_modules_fall_back_to_rgb() {
        let caps = Capabilities::from_module_name("ESP99_MYSTERY_01");
        assert!(caps.rgb);
        assert!(!caps.tunable_white);
    }

    #[test]
    fn library_lookup() {
        assert_eq!(
            product_for("ESP01_SHRGB1C_31").map(|p| p.product_name),
            Some("RGB Bulb A19")
        );
        assert!(product_for("ESP99_MYSTERY_01").is_none());
    }
}
