//! Rolldown plugin that loads stylesheet entries through lightningcss.
//!
//! Content-script CSS and `<link>`-referenced page styles go through the
//! nested builds like any other input; this plugin intercepts `.css` files
//! in the `load` hook, parses and (optionally) minifies them, and hands
//! them to Rolldown as `ModuleType::Css` so they come out as emitted
//! stylesheet assets rather than JavaScript modules.

use std::borrow::Cow;
use std::path::Path;

use anyhow::Context;
use lightningcss::{
    printer::PrinterOptions,
    stylesheet::{MinifyOptions, ParserOptions, StyleSheet},
};
use rolldown_common::ModuleType;
use rolldown_plugin::{HookLoadArgs, HookLoadOutput, HookLoadReturn, Plugin, PluginContext};

/// CSS processing options for the nested builds of one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssOptions {
    /// Minify the emitted stylesheets.
    pub minify: bool,
}

/// Rolldown `load`-hook plugin backed by lightningcss.
#[derive(Debug, Clone, Default)]
pub struct CssLoadPlugin {
    options: CssOptions,
}

impl CssLoadPlugin {
    pub fn new(options: CssOptions) -> Self {
        Self { options }
    }

    fn process(&self, path: &Path, source: String) -> anyhow::Result<String> {
        let mut stylesheet = StyleSheet::parse(
            &source,
            ParserOptions {
                filename: path.to_string_lossy().to_string(),
                ..Default::default()
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to parse CSS from {}: {e:?}", path.display()))?;

        if self.options.minify {
            stylesheet
                .minify(MinifyOptions::default())
                .map_err(|e| anyhow::anyhow!("failed to minify CSS from {}: {e:?}", path.display()))?;
        }

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: self.options.minify,
                ..Default::default()
            })
            .map_err(|e| anyhow::anyhow!("failed to print CSS from {}: {e:?}", path.display()))?;

        Ok(printed.code)
    }
}

impl Plugin for CssLoadPlugin {
    fn name(&self) -> Cow<'static, str> {
        "webext-css".into()
    }

    fn register_hook_usage(&self) -> rolldown_plugin::HookUsage {
        rolldown_plugin::HookUsage::Load
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let id = args.id.to_string();
        let plugin = self.clone();

        async move {
            if !id.ends_with(".css") {
                return Ok(None);
            }

            let source = std::fs::read_to_string(&id)
                .with_context(|| format!("failed to read CSS file: {id}"))?;
            let processed = plugin.process(Path::new(&id), source)?;

            tracing::debug!("processed stylesheet {id} ({} bytes)", processed.len());

            Ok(Some(HookLoadOutput {
                code: processed.into(),
                module_type: Some(ModuleType::Css),
                ..Default::default()
            }))
        }
    }
}
