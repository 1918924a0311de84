use std::path::{Path, PathBuf};

use common::Config;
use process::poll_pending_signals;
use tracing::debug;
use unit::{CompilationUnit, DirectiveProcessor};

use crate::errors::Result;
use crate::toolset::{FlagPosition, Toolset};

/// Drives one script from discovery to a linked executable.
pub struct BuildOrchestrator<'a> {
    config: &'a Config,
    units: Vec<CompilationUnit>,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(config: &'a Config, primary: impl AsRef<Path>) -> Self {
        Self {
            config,
            units: vec![CompilationUnit::source(primary)],
        }
    }

    /// All known units, primary first, in discovery order.
    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn primary_mut(&mut self) -> &mut CompilationUnit {
        &mut self.units[0]
    }

    /// Scan units until no new ones turn up.
    ///
    /// Each unit is scanned once and a unit is only added if no known unit
    /// has the same path, so mutually referring files terminate.
    pub fn discover(&mut self, toolset: &mut Toolset<'_>) -> Result<()> {
        let processor = DirectiveProcessor::new(self.config);

        let mut index = 0;
        while index < self.units.len() {
            if !self.units[index].is_scanned() {
                let found = processor.process(&mut self.units[index])?;
                toolset.push_flags(self.units[index].flags(), FlagPosition::Normal);

                for unit in found {
                    if !self.units.contains(&unit) {
                        debug!("auto-discovered: {}", unit.input_file_name().display());
                        self.units.push(unit);
                    }
                }
            }
            index += 1;
        }
        Ok(())
    }

    pub fn compile(&mut self, toolset: &mut Toolset<'_>) -> Result<()> {
        for unit in self.units.iter_mut().filter(|unit| !unit.is_header()) {
            poll_pending_signals()?;
            toolset.compile(unit)?;
        }
        Ok(())
    }

    pub fn link(&mut self, toolset: &mut Toolset<'_>) -> Result<PathBuf> {
        poll_pending_signals()?;
        Ok(toolset.link(&mut self.units)?)
    }

    /// Discover, compile and link. Temporaries are removed whatever the
    /// outcome; on failure so is a half-made executable.
    pub fn build(&mut self, toolset: &mut Toolset<'_>) -> Result<PathBuf> {
        let built = self
            .discover(toolset)
            .and_then(|()| self.compile(toolset))
            .and_then(|()| self.link(toolset));

        self.cleanup();
        if built.is_err() {
            let config = self.config;
            self.primary_mut().remove_executable(config);
        }
        built
    }

    pub fn cleanup(&mut self) {
        for unit in &mut self.units {
            unit.cleanup(self.config);
        }
    }
}
