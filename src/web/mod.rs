//! Browser host for the backdrop
//!
//! Binds the engine to a canvas, forwards DOM input, and drives `tick` from
//! `requestAnimationFrame`. All handlers share one `Rc<RefCell<WebState>>`;
//! the page is single-threaded so borrows never overlap.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, EventTarget, HtmlCanvasElement, MouseEvent, TouchEvent, Window,
};

use crate::config::{DeviceHints, SimulationConfig};
use crate::constants::splat::AMBIENT_POINTER_ID;
use crate::engine::FluidEngine;
use crate::gpu::WgpuBackend;
use crate::input::PointerPhase;
use crate::present::MaskImage;

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;
type FrameClosure = Closure<dyn FnMut(f64)>;

fn js_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn browser_window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| js_error("no window"))
}

struct Listener {
    target: EventTarget,
    kind: &'static str,
    closure: EventClosure,
}

struct WebState {
    engine: FluidEngine<WgpuBackend>,
    canvas: HtmlCanvasElement,
    listeners: Vec<Listener>,
}

impl WebState {
    /// Canvas-relative surface pixel position of a client coordinate.
    fn surface_position(&self, client_x: f64, client_y: f64) -> (f32, f32) {
        let rect = self.canvas.get_bounding_client_rect();
        let scale_x = self.canvas.width() as f64 / rect.width().max(1.0);
        let scale_y = self.canvas.height() as f64 / rect.height().max(1.0);
        (
            ((client_x - rect.left()) * scale_x) as f32,
            ((client_y - rect.top()) * scale_y) as f32,
        )
    }

    fn sync_size(&mut self, window: &Window) {
        let logical_width = self.canvas.client_width() as f32;
        let logical_height = self.canvas.client_height() as f32;
        let ratio = window.device_pixel_ratio() as f32;
        let (width, height) = self
            .engine
            .config()
            .surface_pixels(logical_width, logical_height, ratio);
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.engine.resize(logical_width, logical_height, ratio);
    }
}

/// Handle returned to JavaScript.
#[wasm_bindgen]
pub struct FluidBackdrop {
    state: Rc<RefCell<WebState>>,
    frame: Rc<RefCell<Option<FrameClosure>>>,
    frame_handle: Rc<Cell<Option<i32>>>,
}

#[wasm_bindgen]
impl FluidBackdrop {
    /// Start the backdrop on the canvas with id `canvas_id`.
    ///
    /// `config_json` may be a partial config; without one the defaults are
    /// tiered from the browser's core count, viewport width and user agent.
    /// Rejects when no graphics context can be opened so the page can fall
    /// back to a static background.
    pub async fn start(
        canvas_id: String,
        config_json: Option<String>,
        on_ready: Option<js_sys::Function>,
    ) -> Result<FluidBackdrop, JsValue> {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            log::debug!("[FluidBackdrop::start] Logger already initialised");
        }

        let window = browser_window()?;
        let document = window.document().ok_or_else(|| js_error("no document"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| js_error(format!("canvas '{}' not found", canvas_id)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| js_error(format!("'{}' is not a canvas", canvas_id)))?;

        let config = match config_json {
            Some(raw) => SimulationConfig::from_json_str(&raw).map_err(js_error)?,
            None => {
                let navigator = window.navigator();
                let hints = DeviceHints {
                    hardware_concurrency: Some(navigator.hardware_concurrency() as usize)
                        .filter(|cores| *cores > 0),
                    viewport_width: window
                        .inner_width()
                        .ok()
                        .and_then(|width| width.as_f64())
                        .unwrap_or(0.0) as u32,
                    user_agent: navigator.user_agent().ok(),
                };
                let tier = hints.tier();
                log::info!("[FluidBackdrop::start] Device tier {:?}", tier);
                SimulationConfig::for_tier(tier)
            }
        };

        let (width, height) = config.surface_pixels(
            canvas.client_width() as f32,
            canvas.client_height() as f32,
            window.device_pixel_ratio() as f32,
        );
        canvas.set_width(width);
        canvas.set_height(height);

        let ready = on_ready.map(|callback| -> crate::engine::ReadyCallback {
            Box::new(move || {
                if let Err(e) = callback.call0(&JsValue::NULL) {
                    log::warn!("[FluidBackdrop] onReady callback threw: {:?}", e);
                }
            })
        });

        let surface_canvas = canvas.clone();
        let engine = crate::start_wgpu(
            move || wgpu::SurfaceTarget::Canvas(surface_canvas.clone()),
            width,
            height,
            config,
            ready,
        )
        .await
        .map_err(js_error)?;

        let backdrop = FluidBackdrop {
            state: Rc::new(RefCell::new(WebState {
                engine,
                canvas,
                listeners: Vec::new(),
            })),
            frame: Rc::new(RefCell::new(None)),
            frame_handle: Rc::new(Cell::new(None)),
        };
        backdrop.attach_listeners(&window)?;
        backdrop.start_loop(&window)?;
        Ok(backdrop)
    }

    /// Cancel the frame loop, detach listeners and release GPU resources.
    pub fn stop(&self) {
        if let (Some(handle), Ok(window)) = (self.frame_handle.take(), browser_window()) {
            if let Err(e) = window.cancel_animation_frame(handle) {
                log::warn!("[FluidBackdrop::stop] cancelAnimationFrame failed: {:?}", e);
            }
        }
        self.frame.borrow_mut().take();

        let mut state = self.state.borrow_mut();
        for listener in state.listeners.drain(..) {
            let _ = listener.target.remove_event_listener_with_callback(
                listener.kind,
                listener.closure.as_ref().unchecked_ref(),
            );
        }
        state.engine.stop();
    }

    /// Distort a rasterised line of text with the flow.
    pub fn set_mask_text(&self, text: &str, font_px: f64, font_family: &str, color: &str) -> Result<(), JsValue> {
        let mask = rasterize_text(text, font_px, font_family, color)?;
        self.state.borrow_mut().engine.set_mask(Some(mask));
        Ok(())
    }

    /// Distort an encoded image (PNG, JPEG, ...) with the flow.
    pub fn set_mask_image(&self, bytes: &[u8]) -> Result<(), JsValue> {
        let mask = MaskImage::from_encoded(bytes).map_err(js_error)?;
        self.state.borrow_mut().engine.set_mask(Some(mask));
        Ok(())
    }

    pub fn clear_mask(&self) {
        self.state.borrow_mut().engine.set_mask(None);
    }
}

impl FluidBackdrop {
    fn listen(
        &self,
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(&mut WebState, web_sys::Event) + 'static,
    ) -> Result<(), JsValue> {
        let state = self.state.clone();
        let mut handler = handler;
        let closure: EventClosure = Closure::wrap(Box::new(move |event: web_sys::Event| {
            if let Ok(mut state) = state.try_borrow_mut() {
                handler(&mut state, event);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())?;
        self.state.borrow_mut().listeners.push(Listener {
            target: target.clone(),
            kind,
            closure,
        });
        Ok(())
    }

    fn attach_listeners(&self, window: &Window) -> Result<(), JsValue> {
        let target: &EventTarget = window.as_ref();

        let mouse = |phase: PointerPhase| {
            move |state: &mut WebState, event: web_sys::Event| {
                if let Some(event) = event.dyn_ref::<MouseEvent>() {
                    if phase != PointerPhase::Move && event.button() != 0 {
                        return;
                    }
                    let (x, y) = state.surface_position(event.client_x() as f64, event.client_y() as f64);
                    state.engine.feed_pointer(AMBIENT_POINTER_ID, x, y, phase);
                }
            }
        };
        self.listen(target, "mousemove", mouse(PointerPhase::Move))?;
        self.listen(target, "mousedown", mouse(PointerPhase::Down))?;
        self.listen(target, "mouseup", mouse(PointerPhase::Up))?;

        let touch = |phase: PointerPhase| {
            move |state: &mut WebState, event: web_sys::Event| {
                if let Some(event) = event.dyn_ref::<TouchEvent>() {
                    let touches = event.changed_touches();
                    for index in 0..touches.length() {
                        if let Some(touch) = touches.get(index) {
                            let (x, y) =
                                state.surface_position(touch.client_x() as f64, touch.client_y() as f64);
                            state
                                .engine
                                .feed_pointer(touch.identifier() as i64, x, y, phase);
                        }
                    }
                }
            }
        };
        self.listen(target, "touchstart", touch(PointerPhase::Down))?;
        self.listen(target, "touchmove", touch(PointerPhase::Move))?;
        self.listen(target, "touchend", touch(PointerPhase::Up))?;
        self.listen(target, "touchcancel", touch(PointerPhase::Up))?;

        self.listen(target, "resize", |state: &mut WebState, _event| {
            if let Ok(window) = browser_window() {
                state.sync_size(&window);
            }
        })?;
        Ok(())
    }

    fn start_loop(&self, window: &Window) -> Result<(), JsValue> {
        let state = self.state.clone();
        let frame = self.frame.clone();
        let frame_handle = self.frame_handle.clone();

        let closure: FrameClosure = Closure::wrap(Box::new(move |timestamp: f64| {
            let keep_running = match state.try_borrow_mut() {
                Ok(mut state) => {
                    let now = Duration::from_secs_f64(timestamp.max(0.0) / 1000.0);
                    match state.engine.tick(now) {
                        Ok(_) => state.engine.is_running(),
                        Err(e) => {
                            log::error!("[FluidBackdrop] Engine stopped: {}", e);
                            state.engine.stop();
                            false
                        }
                    }
                }
                Err(_) => true,
            };

            frame_handle.set(None);
            if !keep_running {
                return;
            }
            if let (Some(callback), Ok(window)) = (frame.borrow().as_ref(), browser_window()) {
                match window.request_animation_frame(callback.as_ref().unchecked_ref()) {
                    Ok(handle) => frame_handle.set(Some(handle)),
                    Err(e) => log::error!("[FluidBackdrop] requestAnimationFrame failed: {:?}", e),
                }
            }
        }) as Box<dyn FnMut(f64)>);

        let handle = window.request_animation_frame(closure.as_ref().unchecked_ref())?;
        self.frame_handle.set(Some(handle));
        *self.frame.borrow_mut() = Some(closure);
        Ok(())
    }
}

impl Drop for FluidBackdrop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Render `text` centred on an offscreen 2D canvas and read it back as RGBA8.
fn rasterize_text(text: &str, font_px: f64, font_family: &str, color: &str) -> Result<MaskImage, JsValue> {
    let document = browser_window()?
        .document()
        .ok_or_else(|| js_error("no document"))?;
    let canvas = document
        .create_element("canvas")?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| js_error("could not create a canvas"))?;
    let context = canvas
        .get_context("2d")?
        .ok_or_else(|| js_error("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| js_error("unexpected 2d context type"))?;

    let font = format!("bold {}px {}", font_px, font_family);
    context.set_font(&font);
    let text_width = context.measure_text(text)?.width();
    let padding = font_px * 0.25;
    let width = (text_width + padding * 2.0).ceil().max(1.0) as u32;
    let height = (font_px * 1.5).ceil().max(1.0) as u32;

    // Resizing resets the context state
    canvas.set_width(width);
    canvas.set_height(height);
    context.set_font(&font);
    context.set_text_align("center");
    context.set_text_baseline("middle");
    context.set_fill_style(&JsValue::from_str(color));
    context.fill_text(text, width as f64 / 2.0, height as f64 / 2.0)?;

    let pixels = context
        .get_image_data(0.0, 0.0, width as f64, height as f64)?
        .data()
        .0;
    MaskImage::from_rgba8(width, height, pixels).map_err(js_error)
}
