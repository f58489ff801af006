//! Keyword/template code generator.
//!
//! Picks a motion mode, palette, speed and size from words in the
//! description and renders one of three fixed templates. Output quality is
//! not a goal; the generator exists so the pipeline runs end to end.

use std::sync::LazyLock;

use async_trait::async_trait;
use fxgen_common::*;
use regex::Regex;
use serde_json::{Value, json};

// "500 particles", "1,200 sparks"
static COUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)\s*(?:particles?|sparks?|points?|flakes?|drops?|stars?)\b")
        .unwrap()
});

const EFFECT_KEYWORDS: &[&str] = &[
    "fire", "smoke", "spark", "rain", "snow", "explosion", "lightning", "glow", "portal",
    "water", "magic",
];

const COLOR_HEX: &[(&str, &str)] = &[
    ("red", "#ff3b30"),
    ("orange", "#ff9500"),
    ("yellow", "#ffcc00"),
    ("green", "#34c759"),
    ("blue", "#007aff"),
    ("purple", "#af52de"),
    ("pink", "#ff2d55"),
    ("white", "#ffffff"),
    ("gold", "#ffd700"),
    ("cyan", "#00e5ff"),
];

const MAX_PARTICLES: u64 = 100_000;
const MAX_SHADER_POINTS: u64 = 200;

/// How particles move in the rendered effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Fall,
    Rise,
    Radial,
    Orbit,
    Drift,
}

impl Motion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fall => "fall",
            Self::Rise => "rise",
            Self::Radial => "radial",
            Self::Orbit => "orbit",
            Self::Drift => "drift",
        }
    }

    fn for_concepts(concepts: &[&str]) -> Self {
        let has = |k: &str| concepts.contains(&k);
        if has("rain") || has("snow") {
            Self::Fall
        } else if has("fire") || has("smoke") {
            Self::Rise
        } else if has("explosion") || has("spark") {
            Self::Radial
        } else if has("portal") || has("magic") {
            Self::Orbit
        } else {
            Self::Drift
        }
    }

    fn glsl(&self) -> &'static str {
        match self {
            Self::Fall => "return vec2(seed.x, 1.0 - fract(seed.y + t * 0.2 * (0.5 + seed.x)));",
            Self::Rise => "return vec2(seed.x * 0.4 + 0.3, fract(seed.y + t * 0.15 * (0.5 + seed.y)));",
            Self::Radial => {
                "float a = seed.x * 6.2831;\n  float r = fract(t * 0.3 + seed.y) * 0.5;\n  return vec2(0.5) + vec2(cos(a), sin(a)) * r;"
            }
            Self::Orbit => {
                "float a = seed.x * 6.2831 + t * (0.5 + seed.y);\n  float r = 0.1 + seed.y * 0.3;\n  return vec2(0.5) + vec2(cos(a), sin(a)) * r;"
            }
            Self::Drift => "return fract(seed + vec2(sin(t * 0.3 + i), cos(t * 0.2 + i)) * 0.1);",
        }
    }
}

/// Everything the templates need, derived from a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Concepts {
    pub keywords: Vec<&'static str>,
    pub colors: Vec<String>,
    pub speed: f64,
    pub size: f64,
    pub particle_count: u64,
    pub motion: Motion,
}

impl Concepts {
    pub fn extract(request: &GenerationRequest) -> Self {
        let text = request.description.to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        let keywords: Vec<&'static str> = EFFECT_KEYWORDS
            .iter()
            .copied()
            .filter(|k| text.contains(k))
            .collect();

        let mut colors: Vec<String> = Vec::new();
        for word in &words {
            if let Some((_, hex)) = COLOR_HEX.iter().find(|(name, _)| name == word)
                && !colors.iter().any(|c| c == hex)
            {
                colors.push(hex.to_string());
            }
        }
        if colors.is_empty() {
            colors = default_palette(&keywords);
        } else if colors.len() == 1 {
            colors.push(colors[0].clone());
        }

        let speed = if has_word(&["fast", "quick", "rapid"]) {
            2.0
        } else if has_word(&["slow", "gentle", "calm"]) {
            0.5
        } else {
            1.0
        };
        let size = if has_word(&["small", "tiny"]) {
            2.0
        } else if has_word(&["large", "big", "huge", "giant"]) {
            8.0
        } else {
            4.0
        };

        let particle_count = request
            .options
            .get("particleCount")
            .and_then(Value::as_u64)
            .or_else(|| count_in_text(&text))
            .map(|n| n.clamp(1, MAX_PARTICLES))
            .unwrap_or(match request.platform {
                Platform::ThreeJs => 1000,
                Platform::Web => 200,
                Platform::Glsl => 64,
            });

        Self {
            motion: Motion::for_concepts(&keywords),
            keywords,
            colors,
            speed,
            size,
            particle_count,
        }
    }

    pub fn parameters(&self) -> Value {
        json!({
            "particleCount": self.particle_count,
            "speed": self.speed,
            "size": self.size,
            "colors": self.colors,
            "mode": self.motion.as_str(),
        })
    }
}

/// A particle count written in the description, e.g. "300 sparks".
fn count_in_text(text: &str) -> Option<u64> {
    COUNT_REGEX
        .captures(text)
        .and_then(|caps| caps[1].replace(',', "").parse().ok())
}

fn default_palette(keywords: &[&str]) -> Vec<String> {
    let has = |k: &str| keywords.contains(&k);
    let palette: [&str; 2] = if has("fire") || has("explosion") {
        ["#ff5a1f", "#ffc247"]
    } else if has("water") || has("rain") {
        ["#3fa9f5", "#bde4ff"]
    } else if has("snow") {
        ["#ffffff", "#dfefff"]
    } else if has("magic") || has("portal") {
        ["#9b5cff", "#42e8ff"]
    } else if has("smoke") {
        ["#8a8a8a", "#cfcfcf"]
    } else {
        ["#ffffff", "#8ecbff"]
    };
    palette.iter().map(|c| c.to_string()).collect()
}

fn hex_to_vec3(hex: &str) -> String {
    let channel = |range: std::ops::Range<usize>| {
        hex.trim_start_matches('#')
            .get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .map(|v| f64::from(v) / 255.0)
            .unwrap_or(1.0)
    };
    format!("{:.3}, {:.3}, {:.3}", channel(0..2), channel(2..4), channel(4..6))
}

const WEB_TEMPLATE: &str = r#"// Effect: {{description}}
// Generated by fxgen (web / canvas 2d)
const canvas = document.getElementById('fx-canvas') || document.body.appendChild(document.createElement('canvas'));
const ctx = canvas.getContext('2d');
const PARAMS = {{params}};

function resize() {
  canvas.width = window.innerWidth;
  canvas.height = window.innerHeight;
}
window.addEventListener('resize', resize);
resize();

function spawn() {
  const cx = canvas.width / 2;
  const cy = canvas.height / 2;
  const angle = Math.random() * Math.PI * 2;
  const speed = PARAMS.speed * (0.5 + Math.random());
  const color = PARAMS.colors[Math.floor(Math.random() * PARAMS.colors.length)];
  switch (PARAMS.mode) {
    case 'fall':
      return { x: Math.random() * canvas.width, y: -10, vx: 0, vy: speed * 3, life: 1, color };
    case 'rise':
      return { x: cx + (Math.random() - 0.5) * 80, y: canvas.height, vx: (Math.random() - 0.5) * speed, vy: -speed * 2, life: 1, color };
    case 'radial':
      return { x: cx, y: cy, vx: Math.cos(angle) * speed * 4, vy: Math.sin(angle) * speed * 4, life: 1, color };
    case 'orbit':
      return { x: cx, y: cy, angle, radius: 20 + Math.random() * 120, vx: 0, vy: 0, life: 1, color };
    default:
      return { x: Math.random() * canvas.width, y: Math.random() * canvas.height, vx: (Math.random() - 0.5) * speed, vy: (Math.random() - 0.5) * speed, life: 1, color };
  }
}

const particles = Array.from({ length: PARAMS.particleCount }, spawn);

function step(p) {
  if (PARAMS.mode === 'orbit') {
    p.angle += 0.02 * PARAMS.speed;
    p.x = canvas.width / 2 + Math.cos(p.angle) * p.radius;
    p.y = canvas.height / 2 + Math.sin(p.angle) * p.radius;
  } else {
    p.x += p.vx;
    p.y += p.vy;
  }
  p.life -= 0.005 * PARAMS.speed;
  return p.life > 0 && p.y < canvas.height + 20 && p.y > -20;
}

function render() {
  ctx.fillStyle = 'rgba(0, 0, 0, 0.2)';
  ctx.fillRect(0, 0, canvas.width, canvas.height);
  for (let i = 0; i < particles.length; i++) {
    if (!step(particles[i])) particles[i] = spawn();
    const p = particles[i];
    ctx.globalAlpha = Math.max(p.life, 0);
    ctx.fillStyle = p.color;
    ctx.beginPath();
    ctx.arc(p.x, p.y, PARAMS.size * p.life, 0, Math.PI * 2);
    ctx.fill();
  }
  ctx.globalAlpha = 1;
  requestAnimationFrame(render);
}

render();
"#;

const THREEJS_TEMPLATE: &str = r#"// Effect: {{description}}
// Generated by fxgen (threejs / points)
import * as THREE from 'three';

const PARAMS = {{params}};

const scene = new THREE.Scene();
const camera = new THREE.PerspectiveCamera(60, window.innerWidth / window.innerHeight, 0.1, 1000);
camera.position.z = 60;
const renderer = new THREE.WebGLRenderer({ antialias: true, alpha: true });
renderer.setSize(window.innerWidth, window.innerHeight);
document.body.appendChild(renderer.domElement);

const count = PARAMS.particleCount;
const positions = new Float32Array(count * 3);
const colors = new Float32Array(count * 3);
const speeds = new Float32Array(count);
const palette = PARAMS.colors.map((hex) => new THREE.Color(hex));

for (let i = 0; i < count; i++) {
  positions[i * 3] = (Math.random() - 0.5) * 80;
  positions[i * 3 + 1] = (Math.random() - 0.5) * 80;
  positions[i * 3 + 2] = (Math.random() - 0.5) * 80;
  const c = palette[i % palette.length];
  colors[i * 3] = c.r;
  colors[i * 3 + 1] = c.g;
  colors[i * 3 + 2] = c.b;
  speeds[i] = PARAMS.speed * (0.5 + Math.random());
}

const geometry = new THREE.BufferGeometry();
geometry.setAttribute('position', new THREE.BufferAttribute(positions, 3));
geometry.setAttribute('color', new THREE.BufferAttribute(colors, 3));

const material = new THREE.PointsMaterial({
  size: PARAMS.size * 0.25,
  vertexColors: true,
  transparent: true,
  opacity: 0.9,
  blending: THREE.AdditiveBlending,
  depthWrite: false,
});
const points = new THREE.Points(geometry, material);
scene.add(points);

function advance(i, t) {
  const x = i * 3;
  const y = i * 3 + 1;
  const z = i * 3 + 2;
  switch (PARAMS.mode) {
    case 'fall':
      positions[y] -= speeds[i] * 0.3;
      if (positions[y] < -40) positions[y] = 40;
      break;
    case 'rise':
      positions[y] += speeds[i] * 0.3;
      if (positions[y] > 40) positions[y] = -40;
      break;
    case 'radial': {
      const scale = 1 + speeds[i] * 0.01;
      positions[x] *= scale;
      positions[y] *= scale;
      positions[z] *= scale;
      if (Math.abs(positions[y]) > 60) {
        positions[x] = (Math.random() - 0.5) * 2;
        positions[y] = (Math.random() - 0.5) * 2;
        positions[z] = (Math.random() - 0.5) * 2;
      }
      break;
    }
    case 'orbit': {
      const a = 0.005 * speeds[i];
      const px = positions[x];
      const pz = positions[z];
      positions[x] = px * Math.cos(a) - pz * Math.sin(a);
      positions[z] = px * Math.sin(a) + pz * Math.cos(a);
      break;
    }
    default:
      positions[y] += Math.sin(t + i) * 0.02 * speeds[i];
  }
}

function animate(time) {
  const t = time * 0.001;
  for (let i = 0; i < count; i++) advance(i, t);
  geometry.attributes.position.needsUpdate = true;
  points.rotation.y += 0.001 * PARAMS.speed;
  renderer.render(scene, camera);
  requestAnimationFrame(animate);
}

requestAnimationFrame(animate);
"#;

const GLSL_TEMPLATE: &str = r#"// Effect: {{description}}
// Generated by fxgen (glsl / fragment shader)
precision mediump float;

uniform float u_time;
uniform vec2 u_resolution;

const int COUNT = {{count}};
const float SPEED = {{speed}};
const float SIZE = {{size}};
const vec3 COLOR_A = vec3({{color_a}});
const vec3 COLOR_B = vec3({{color_b}});

float hash(float n) {
  return fract(sin(n) * 43758.5453123);
}

vec2 position(float i, float t) {
  vec2 seed = vec2(hash(i), hash(i + 17.0));
  {{motion}}
}

void main() {
  vec2 uv = gl_FragCoord.xy / u_resolution.xy;
  float aspect = u_resolution.x / u_resolution.y;
  vec3 color = vec3(0.0);
  float t = u_time * SPEED;
  for (int i = 0; i < COUNT; i++) {
    float fi = float(i);
    vec2 p = position(fi, t);
    vec2 d = (uv - p) * vec2(aspect, 1.0);
    float intensity = (SIZE * 0.0005) / max(dot(d, d), 0.00001);
    color += mix(COLOR_A, COLOR_B, hash(fi + 3.0)) * intensity;
  }
  gl_FragColor = vec4(clamp(color, 0.0, 1.0), 1.0);
}
"#;

/// Renders effect code from fixed per-platform templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    fn render(&self, request: &GenerationRequest, concepts: &Concepts) -> String {
        let description = request.description.replace(['\r', '\n'], " ");
        match request.platform {
            Platform::Web | Platform::ThreeJs => {
                let template = if request.platform == Platform::Web {
                    WEB_TEMPLATE
                } else {
                    THREEJS_TEMPLATE
                };
                template
                    .replace("{{description}}", description.trim())
                    .replace("{{params}}", &concepts.parameters().to_string())
            }
            Platform::Glsl => {
                let color_b = concepts.colors.get(1).unwrap_or(&concepts.colors[0]);
                GLSL_TEMPLATE
                    .replace("{{description}}", description.trim())
                    .replace(
                        "{{count}}",
                        &concepts.particle_count.min(MAX_SHADER_POINTS).to_string(),
                    )
                    .replace("{{speed}}", &format!("{:.2}", concepts.speed))
                    .replace("{{size}}", &format!("{:.2}", concepts.size))
                    .replace("{{color_a}}", &hex_to_vec3(&concepts.colors[0]))
                    .replace("{{color_b}}", &hex_to_vec3(color_b))
                    .replace("{{motion}}", concepts.motion.glsl())
            }
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        if request.description.trim().is_empty() {
            return Err(GenerationError::EmptyDescription);
        }
        let concepts = Concepts::extract(request);
        let code = self.render(request, &concepts);
        Ok(GenerationOutput {
            code,
            metadata: json!({
                "generator": "template",
                "platform": request.platform.as_str(),
                "concepts": concepts.keywords,
                "colors": concepts.colors,
                "parameters": concepts.parameters(),
            }),
        })
    }

    fn estimate_ms(&self, request: &GenerationRequest) -> Option<i64> {
        let base = match request.platform {
            Platform::Web => 3000,
            Platform::Glsl => 4000,
            Platform::ThreeJs => 4500,
        };
        let per_char = (request.description.chars().count() as i64 * 10).min(2000);
        Some(base + per_char)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cataloger::{classify_category, classify_type};

    fn request(description: &str, platform: Platform) -> GenerationRequest {
        GenerationRequest::new(description, platform)
    }

    #[test]
    fn test_extract_concepts() {
        let concepts = Concepts::extract(&request("Fast red and gold fire sparks", Platform::Web));
        assert_eq!(concepts.keywords, vec!["fire", "spark"]);
        assert_eq!(concepts.colors, vec!["#ff3b30", "#ffd700"]);
        assert_eq!(concepts.speed, 2.0);
        assert_eq!(concepts.size, 4.0);
        assert_eq!(concepts.particle_count, 200);
        assert_eq!(concepts.motion, Motion::Rise);
    }

    #[test]
    fn test_motion_selection() {
        let motion = |d: &str| Concepts::extract(&request(d, Platform::Web)).motion;
        assert_eq!(motion("gentle snow"), Motion::Fall);
        assert_eq!(motion("big explosion"), Motion::Radial);
        assert_eq!(motion("magic portal"), Motion::Orbit);
        assert_eq!(motion("floating dust"), Motion::Drift);
    }

    #[test]
    fn test_single_color_is_doubled_and_default_palette_used() {
        let one = Concepts::extract(&request("blue dust", Platform::Web));
        assert_eq!(one.colors, vec!["#007aff", "#007aff"]);

        let none = Concepts::extract(&request("rain", Platform::Web));
        assert_eq!(none.colors, vec!["#3fa9f5", "#bde4ff"]);
    }

    #[test]
    fn test_particle_count_option_is_clamped() {
        let req = request("stars", Platform::ThreeJs)
            .with_options(json!({"particleCount": 5_000_000}));
        assert_eq!(Concepts::extract(&req).particle_count, MAX_PARTICLES);

        let req = request("stars", Platform::ThreeJs);
        assert_eq!(Concepts::extract(&req).particle_count, 1000);
    }

    #[test]
    fn test_particle_count_from_description() {
        let count = |d: &str| Concepts::extract(&request(d, Platform::Web)).particle_count;
        assert_eq!(count("500 red particles"), 200);
        assert_eq!(count("1,500 sparks flying"), 1500);
        assert_eq!(count("a burst of 300 sparks"), 300);
        assert_eq!(count("12 dropships"), 200);

        // Options win over the description.
        let req = request("300 sparks", Platform::Web).with_options(json!({"particleCount": 40}));
        assert_eq!(Concepts::extract(&req).particle_count, 40);
    }

    #[test]
    fn test_hex_to_vec3() {
        assert_eq!(hex_to_vec3("#ff0000"), "1.000, 0.000, 0.000");
        assert_eq!(hex_to_vec3("#zz"), "1.000, 1.000, 1.000");
    }

    #[tokio::test]
    async fn test_generate_each_platform() {
        let generator = TemplateGenerator::new();
        for platform in [Platform::Web, Platform::ThreeJs, Platform::Glsl] {
            let output = generator
                .generate(&request("purple magic portal", platform))
                .await
                .unwrap();
            assert!(!output.code.contains("{{"), "unfilled placeholder for {}", platform);
            assert!(output.code.starts_with("// Effect: purple magic portal"));
            assert_eq!(output.metadata["generator"], "template");
            assert_eq!(output.metadata["platform"], platform.as_str());
            assert_eq!(output.metadata["parameters"]["mode"], "orbit");
        }
    }

    #[tokio::test]
    async fn test_glsl_output_is_a_fragment_shader() {
        let output = TemplateGenerator::new()
            .generate(&request("red rain", Platform::Glsl))
            .await
            .unwrap();
        assert!(output.code.contains("gl_FragColor"));
        assert!(output.code.contains("const int COUNT = 64;"));
        assert!(output.code.contains("vec3(1.000, 0.231, 0.188)"));
    }

    #[tokio::test]
    async fn test_empty_description_is_rejected() {
        let err = TemplateGenerator::new()
            .generate(&request("   ", Platform::Web))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyDescription));
    }

    #[tokio::test]
    async fn test_templates_do_not_bias_classification() {
        // Classification of neutral descriptions must come out as the fallback.
        let generator = TemplateGenerator::new();
        for platform in [Platform::Web, Platform::ThreeJs, Platform::Glsl] {
            let output = generator.generate(&request("confetti", platform)).await.unwrap();
            assert_eq!(classify_type(&output.code), EffectType::Particle, "{}", platform);
            assert_eq!(classify_category(&output.code), EffectCategory::Effect, "{}", platform);
        }
    }

    #[test]
    fn test_estimate_scales_with_platform_and_length() {
        let generator = TemplateGenerator::new();
        let web = generator.estimate_ms(&request("fire", Platform::Web)).unwrap();
        let three = generator.estimate_ms(&request("fire", Platform::ThreeJs)).unwrap();
        let long = generator
            .estimate_ms(&request(&"fire ".repeat(100), Platform::Web))
            .unwrap();
        assert_eq!(web, 3040);
        assert!(three > web);
        assert_eq!(long, 5000);
    }
}
