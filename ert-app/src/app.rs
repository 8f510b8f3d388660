use crate::render::{RenderStyle, SurfaceRenderer};
use anyhow::Result;
use ert_core::{KeyMap, KeyRole};
use ert_port::EventPort;
use ert_task::TaskEngine;
use ert_timing::MonotonicClock;
use pixels::{Pixels, SurfaceTexture};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Fullscreen, Window, WindowId},
};

type Engine = TaskEngine<MonotonicClock, Box<dyn EventPort>>;

/// Windowed front end: owns the surface and routes redraws and key
/// presses into the engine. The engine itself never touches winit.
pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SurfaceRenderer>,
    engine: Engine,
    keys: KeyMap,
    style: RenderStyle,
    record_path: PathBuf,
    full_screen: bool,
    record_written: bool,
}

impl App {
    pub fn new(
        engine: Engine,
        keys: KeyMap,
        style: RenderStyle,
        record_path: PathBuf,
        full_screen: bool,
    ) -> Self {
        Self {
            window: None,
            pixels: None,
            renderer: None,
            engine,
            keys,
            style,
            record_path,
            full_screen,
            record_written: false,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;
        // Covers abnormal loop exits (e.g. the window manager killing
        // the window); normal paths have already written.
        self.write_record();
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut attributes = Window::default_attributes()
            .with_title("Extinction Recall")
            .with_resizable(false);
        if self.full_screen {
            let monitor = event_loop
                .primary_monitor()
                .or_else(|| event_loop.available_monitors().next());
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(monitor)));
        } else {
            attributes = attributes.with_inner_size(LogicalSize::new(1280.0, 720.0));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(width = size.width, height = size.height, "window created");

        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface)?);
        self.renderer = Some(SurfaceRenderer::new(
            size.width,
            size.height,
            self.style.clone(),
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        self.engine.tick();

        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut())
        else {
            return Ok(());
        };
        renderer.render(
            self.engine.current_screen(),
            self.engine.rating_value(),
            pixels.frame_mut(),
        )?;
        pixels.render()?;
        Ok(())
    }

    fn handle_key(&mut self, key: &Key) {
        let role = match key {
            Key::Named(NamedKey::Escape) => Some(KeyRole::Cancel),
            Key::Character(s) => s
                .chars()
                .next()
                .map(|ch| self.keys.classify(ch.to_ascii_lowercase())),
            _ => None,
        };
        if let Some(role) = role {
            self.engine.handle_key(role);
        }
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(pixels) = self.pixels.as_mut() {
            if let Err(e) = pixels.resize_surface(width, height) {
                error!(error = %e, "surface resize failed");
            }
            if let Err(e) = pixels.resize_buffer(width, height) {
                error!(error = %e, "buffer resize failed");
            }
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.resize(width, height);
        }
    }

    /// Saves the session record. Idempotent; called on every exit path.
    fn write_record(&mut self) {
        if self.record_written {
            return;
        }
        match File::create(&self.record_path) {
            Ok(file) => {
                if let Err(e) =
                    serde_json::to_writer_pretty(file, self.engine.session_record())
                {
                    error!(error = %e, "cannot serialize session record");
                } else {
                    info!(path = %self.record_path.display(), "session record written");
                    self.record_written = true;
                }
            }
            Err(e) => {
                error!(path = %self.record_path.display(), error = %e, "cannot create session record")
            }
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        self.write_record();
        if let Some(reason) = self.engine.end_reason() {
            info!(?reason, "session ended");
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!(error = %e, "cannot create window and surface");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                // Same semantics as the cancel key: completion on the
                // end page, abort anywhere else.
                self.engine.handle_key(KeyRole::Cancel);
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    error!(error = %e, "render failed");
                    event_loop.exit();
                    return;
                }
                if self.engine.is_finished() {
                    self.cleanup_and_exit(event_loop);
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_key(&event.logical_key);
                if self.engine.is_finished() {
                    self.cleanup_and_exit(event_loop);
                }
            }
            WindowEvent::Resized(size) => self.handle_resize(size.width, size.height),
            _ => {}
        }
    }
}
