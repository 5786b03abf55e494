//! ashost-doom: runs the DOOM WebAssembly port on top of `ashost-core`.
//!
//! Guest imports provided here:
//! - `env.memory`: 108 pages, created by the host
//! - `js.js_console_log(ptr, len)`, `js.js_stdout(ptr, len)`, `js.js_stderr(ptr, len)`
//! - `js.js_draw_screen(offset)`: a native 640x400 RGBA frame at `offset`
//! - `js.js_milliseconds_since_start() -> f64`
//!
//! Guest exports used: `main`, `doom_loop_step`, `add_browser_event(type, key)`.
//!
//! The host drives the loop: call [`Doom::step`] once per frame.

mod keyboard;
pub mod logger;
pub mod screen;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use ashost_core::heap::Heap;
use ashost_core::{Bridge, HostState, Loader, ModuleSource, Val, abi, state};
use wasmtime::{Caller, Linker, MemoryType};

pub use keyboard::{KeyEvent, map_key_code};
pub use logger::GuestLogger;
pub use screen::{DOOM_HEIGHT, DOOM_WIDTH, FRAME_BYTES, Pixel, downsample};

/// Initial size of `env.memory`.
pub const MEMORY_PAGES: u32 = 108;
pub const DEFAULT_WASM_PATH: &str = "doom.wasm";

const IMPORT_MODULE: &str = "js";

pub type PixelCallback = Box<dyn FnMut(Pixel) + Send>;
pub type FrameCallback = Box<dyn FnMut(&[u8]) + Send>;

pub struct DoomOptions {
    /// Output size; sampled from the native frame at 2x.
    pub screen_width: u32,
    pub screen_height: u32,
    pub wasm_path: PathBuf,
    /// Forward guest console output to `log`.
    pub enable_logs: bool,
    /// Called for every output pixel of every frame.
    pub on_pixel: Option<PixelCallback>,
    /// Called with the full native frame.
    pub on_frame: Option<FrameCallback>,
}

impl DoomOptions {
    pub fn new(screen_width: u32, screen_height: u32) -> Self {
        Self {
            screen_width,
            screen_height,
            wasm_path: PathBuf::from(DEFAULT_WASM_PATH),
            enable_logs: false,
            on_pixel: None,
            on_frame: None,
        }
    }
}

struct Renderer {
    width: u32,
    height: u32,
    on_pixel: Option<PixelCallback>,
    on_frame: Option<FrameCallback>,
}

impl Renderer {
    fn render(&mut self, frame: &[u8]) {
        if let Some(on_pixel) = self.on_pixel.as_mut() {
            downsample(frame, self.width, self.height, |p| on_pixel(p));
        }
        if let Some(on_frame) = self.on_frame.as_mut() {
            on_frame(frame);
        }
    }
}

pub struct Doom {
    wasm_path: PathBuf,
    enable_logs: bool,
    renderer: Arc<Mutex<Renderer>>,
    bridge: Option<Bridge>,
}

impl Doom {
    pub fn new(options: DoomOptions) -> Self {
        Self {
            wasm_path: options.wasm_path,
            enable_logs: options.enable_logs,
            renderer: Arc::new(Mutex::new(Renderer {
                width: options.screen_width,
                height: options.screen_height,
                on_pixel: options.on_pixel,
                on_frame: options.on_frame,
            })),
            bridge: None,
        }
    }

    /// Load the module from `wasm_path` and run `main`.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let path = self.wasm_path.clone();
        self.start_from(path)
    }

    /// Load the module from any source and run `main`.
    pub fn start_from(&mut self, source: impl Into<ModuleSource>) -> anyhow::Result<()> {
        let mut loader = Loader::new()?;
        loader.define_memory(
            abi::IMPORT_MODULE,
            abi::host_imports::MEMORY,
            MemoryType::new(MEMORY_PAGES, None),
        )?;
        self.define_imports(loader.linker_mut())?;

        let mut bridge = loader
            .instantiate_streaming(source)
            .context("failed to load the DOOM module")?
            .exports;
        bridge.call("main", &[])?;
        log::debug!("DOOM started");
        self.bridge = Some(bridge);
        Ok(())
    }

    /// Run one iteration of the game loop.
    pub fn step(&mut self) -> anyhow::Result<()> {
        self.started()?.call("doom_loop_step", &[])?;
        Ok(())
    }

    /// Browser key code pressed.
    pub fn key_down(&mut self, key_code: u32) -> anyhow::Result<()> {
        self.key_event(KeyEvent::Down, key_code)
    }

    pub fn key_up(&mut self, key_code: u32) -> anyhow::Result<()> {
        self.key_event(KeyEvent::Up, key_code)
    }

    pub fn bridge_mut(&mut self) -> Option<&mut Bridge> {
        self.bridge.as_mut()
    }

    fn key_event(&mut self, event: KeyEvent, key_code: u32) -> anyhow::Result<()> {
        let args = [Val::I32(event as i32), Val::I32(map_key_code(key_code) as i32)];
        self.started()?.call("add_browser_event", &args)?;
        Ok(())
    }

    fn started(&mut self) -> anyhow::Result<&mut Bridge> {
        self.bridge
            .as_mut()
            .ok_or_else(|| anyhow!("DOOM has not been started"))
    }

    fn define_imports(&self, linker: &mut Linker<HostState>) -> anyhow::Result<()> {
        let console = [
            ("js_console_log", log::Level::Info),
            ("js_stdout", log::Level::Info),
            ("js_stderr", log::Level::Error),
        ];
        for (name, level) in console {
            let logger = self.enable_logs.then(|| GuestLogger::new(level));
            linker.func_wrap(
                IMPORT_MODULE,
                name,
                move |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> anyhow::Result<()> {
                    let Some(logger) = logger else {
                        return Ok(());
                    };
                    let memory = state::caller_memory(&mut caller)
                        .ok_or_else(|| anyhow!("guest memory is not available"))?;
                    logger.write(memory.data(&caller), ptr, len)?;
                    Ok(())
                },
            )?;
        }

        let renderer = Arc::clone(&self.renderer);
        linker.func_wrap(
            IMPORT_MODULE,
            "js_draw_screen",
            move |mut caller: Caller<'_, HostState>, offset: u32| -> anyhow::Result<()> {
                let memory = state::caller_memory(&mut caller)
                    .ok_or_else(|| anyhow!("guest memory is not available"))?;
                let frame = Heap::new(memory.data(&caller)).slice(offset, FRAME_BYTES)?;
                renderer
                    .lock()
                    .map_err(|_| anyhow!("renderer lock poisoned"))?
                    .render(frame);
                Ok(())
            },
        )?;

        linker.func_wrap(
            IMPORT_MODULE,
            "js_milliseconds_since_start",
            |caller: Caller<'_, HostState>| -> f64 { caller.data().elapsed_millis() },
        )?;

        Ok(())
    }
}
