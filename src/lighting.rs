use glam::Vec3;
use roxmltree::{Document, Node};
use serde::Deserialize;
use thiserror::Error;

/// Directional light and material parameters read by the fragment stage.
///
/// `Lighting::default()` is the fixed model: a single light along (1,1,1),
/// 0.2 ambient, 0.8 diffuse weight and a neutral 0.7 gray surface.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Lighting {
    /// World-space direction towards the light. Normalized by the shader.
    #[serde(default = "default_direction")]
    pub direction: Vec3,
    #[serde(default = "default_ambient")]
    pub ambient: f32,
    #[serde(default = "default_diffuse_weight")]
    pub diffuse_weight: f32,
    #[serde(default = "default_base_color")]
    pub base_color: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            ambient: default_ambient(),
            diffuse_weight: default_diffuse_weight(),
            base_color: default_base_color(),
        }
    }
}

fn default_direction() -> Vec3 {
    Vec3::ONE
}

fn default_ambient() -> f32 {
    0.2
}

fn default_diffuse_weight() -> f32 {
    0.8
}

fn default_base_color() -> Vec3 {
    Vec3::splat(0.7)
}

#[derive(Debug, Error)]
pub enum LightingError {
    #[error("invalid lighting XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid lighting JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a <lighting> root element, found <{0}>")]
    UnexpectedRoot(String),
    #[error("<{tag}> must hold {expected} number(s), got {value:?}")]
    InvalidValue {
        tag: &'static str,
        expected: usize,
        value: String,
    },
    #[error("light direction must be finite and non-zero, got {0}")]
    DegenerateDirection(Vec3),
}

impl Lighting {
    /// Parses a lighting document.
    ///
    /// ```xml
    /// <lighting>
    ///     <direction>1 1 1</direction>
    ///     <ambient>0.2</ambient>
    ///     <diffuse>0.8</diffuse>
    ///     <color>0.7 0.7 0.7</color>
    /// </lighting>
    /// ```
    ///
    /// Missing elements keep their default value.
    pub fn from_xml(xml: &str) -> Result<Self, LightingError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        if !root.has_tag_name("lighting") {
            return Err(LightingError::UnexpectedRoot(
                root.tag_name().name().to_string(),
            ));
        }

        let defaults = Self::default();
        let lighting = Self {
            direction: parse_vec3(&root, "direction", defaults.direction)?,
            ambient: parse_f32(&root, "ambient", defaults.ambient)?,
            diffuse_weight: parse_f32(&root, "diffuse", defaults.diffuse_weight)?,
            base_color: parse_vec3(&root, "color", defaults.base_color)?,
        };
        lighting.validate()?;
        Ok(lighting)
    }

    /// Parses a lighting object such as
    /// `{"direction": [0, 1, 0], "ambient": 0.1}`.
    ///
    /// Field names follow the struct; missing fields keep their default value.
    pub fn from_json(json: &str) -> Result<Self, LightingError> {
        let lighting: Self = serde_json::from_str(json)?;
        lighting.validate()?;
        Ok(lighting)
    }

    /// Rejects a light direction the shader cannot normalize.
    pub fn validate(&self) -> Result<(), LightingError> {
        if !self.direction.is_finite() || self.direction.length_squared() <= f32::EPSILON {
            return Err(LightingError::DegenerateDirection(self.direction));
        }
        Ok(())
    }

    /// Unit vector towards the light.
    pub fn light_dir(&self) -> Vec3 {
        self.direction.normalize()
    }
}

fn optional_text<'a>(node: &Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn parse_f32(node: &Node<'_, '_>, tag: &'static str, default: f32) -> Result<f32, LightingError> {
    let Some(text) = optional_text(node, tag) else {
        return Ok(default);
    };
    text.parse::<f32>()
        .map_err(|_| LightingError::InvalidValue {
            tag,
            expected: 1,
            value: text.to_string(),
        })
}

fn parse_vec3(node: &Node<'_, '_>, tag: &'static str, default: Vec3) -> Result<Vec3, LightingError> {
    let Some(text) = optional_text(node, tag) else {
        return Ok(default);
    };
    let invalid = || LightingError::InvalidValue {
        tag,
        expected: 3,
        value: text.to_string(),
    };
    let components = text
        .split_whitespace()
        .map(str::parse::<f32>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    match components.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(invalid()),
    }
}
