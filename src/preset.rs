//! YAML filter-chain presets and live reloading.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::filter::{self, Filter as _, FilterChannel, FilterGroup};
use crate::raster::RasterImage;

fn default_progress() -> f32 {
    0.5
}

fn full_progress() -> f32 {
    1.0
}

/// One filter in a preset chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilterSpec {
    Passthrough,
    Brightness {
        #[serde(default = "default_progress")]
        progress: f32,
    },
    Contrast {
        #[serde(default = "default_progress")]
        progress: f32,
    },
    Saturation {
        #[serde(default = "default_progress")]
        progress: f32,
    },
    Tone {
        #[serde(default = "default_progress")]
        brightness: f32,
        #[serde(default = "default_progress")]
        contrast: f32,
    },
    Blur {
        #[serde(default)]
        progress: f32,
    },
    Lookup {
        lut: PathBuf,
        #[serde(default = "full_progress")]
        progress: f32,
    },
    Custom {
        shader: PathBuf,
    },
}

/// A preset: an ordered filter chain plus optional display settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSpec {
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Letterbox background, ARGB packed.
    #[serde(default)]
    pub background: Option<u32>,
}

impl ChainSpec {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read preset {:?}", path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse preset {:?}", path))
    }

    /// Builds the chain as a filter group with each spec's progress applied.
    /// An empty spec builds a passthrough chain.
    pub fn build(&self) -> Result<FilterGroup> {
        let mut group = FilterGroup::new("chain");
        for spec in &self.filters {
            match spec {
                FilterSpec::Passthrough => {
                    group.add_filter(Box::new(filter::ShaderFilter::passthrough()));
                }
                FilterSpec::Brightness { progress } => {
                    let mut f = filter::adjust::brightness();
                    f.set_progress(*progress, FilterChannel::Brightness);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Contrast { progress } => {
                    let mut f = filter::adjust::contrast();
                    f.set_progress(*progress, FilterChannel::Contrast);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Saturation { progress } => {
                    let mut f = filter::adjust::saturation();
                    f.set_progress(*progress, FilterChannel::Saturation);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Tone {
                    brightness,
                    contrast,
                } => {
                    let mut f = filter::adjust::tone();
                    f.set_progress(*brightness, FilterChannel::Brightness);
                    f.set_progress(*contrast, FilterChannel::Contrast);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Blur { progress } => {
                    let mut f = filter::GaussianBlurFilter::new();
                    f.set_progress(*progress, FilterChannel::BlurRadius);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Lookup { lut, progress } => {
                    let image = RasterImage::open(lut)?;
                    let mut f = filter::lookup::lookup(image);
                    f.set_progress(*progress, FilterChannel::LutIntensity);
                    group.add_filter(Box::new(f));
                }
                FilterSpec::Custom { shader } => {
                    let source = filter::custom::load_shader_source(shader)?;
                    group.add_filter(Box::new(filter::custom::custom(
                        "custom",
                        source,
                        Vec::new(),
                    )));
                }
            }
        }
        if group.is_empty() {
            group.add_filter(Box::new(filter::ShaderFilter::passthrough()));
        }
        Ok(group)
    }
}

/// Watches a preset file and reloads it on change.
pub struct PresetWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
}

impl PresetWatcher {
    /// Starts watching; returns `None` (with a warning) when the watcher
    /// cannot be established, so a broken watch never blocks startup.
    pub fn new(path: PathBuf) -> Option<Self> {
        let (tx, rx) = channel();
        match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    warn!("failed to watch preset file {:?}: {}", path, e);
                    return None;
                }
                info!("watching preset file {:?} for changes", path);
                Some(Self {
                    path,
                    _watcher: watcher,
                    rx,
                })
            }
            Err(e) => {
                warn!("failed to create preset watcher: {}", e);
                None
            }
        }
    }

    /// Drains pending filesystem events and reparses the preset if it was
    /// modified. Parse failures are logged and skipped; the previous chain
    /// stays live.
    pub fn check_for_changes(&mut self) -> Option<ChainSpec> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                ) {
                    needs_reload = true;
                }
            }
        }

        if needs_reload {
            info!("preset file changed, reloading");
            match ChainSpec::load(&self.path) {
                Ok(spec) => return Some(spec),
                Err(e) => error!("failed to reload preset: {e:#}"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_yaml() {
        let yaml = r#"
filters:
  - kind: brightness
    progress: 0.8
  - kind: blur
    progress: 0.25
  - kind: saturation
background: 0xFF202020
"#;
        let spec: ChainSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.filters.len(), 3);
        assert!(matches!(
            spec.filters[0],
            FilterSpec::Brightness { progress } if (progress - 0.8).abs() < 1e-6
        ));
        assert!(matches!(
            spec.filters[2],
            FilterSpec::Saturation { progress } if (progress - 0.5).abs() < 1e-6
        ));
        assert_eq!(spec.background, Some(0xFF20_2020));
    }

    #[test]
    fn test_build_preserves_chain_order() {
        let spec = ChainSpec {
            filters: vec![
                FilterSpec::Brightness { progress: 0.5 },
                FilterSpec::Blur { progress: 0.1 },
                FilterSpec::Contrast { progress: 0.5 },
            ],
            background: None,
        };
        let group = spec.build().unwrap();
        assert_eq!(
            group.flattened_labels(),
            vec!["brightness", "gaussian-blur", "contrast"]
        );
    }

    #[test]
    fn test_empty_spec_builds_passthrough() {
        let group = ChainSpec::default().build().unwrap();
        assert_eq!(group.flattened_labels(), vec!["passthrough"]);
    }
}
