//! Live chart instance (the rendering handle).
//!
//! A `ChartHandle` is created and owned by [`crate::host::ChartHost`]. Scripts
//! mutate it through `myChart`, image export reads from it. It is not
//! thread-safe by construction: all access happens on the session thread.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::SandboxError;
use crate::raster::{self, EncodedImage, ImageRequest};

/// Callback registered with `on(eventName, callback)`.
pub type Listener = Rc<dyn Fn(&Value) -> Result<(), SandboxError>>;

/// Result of firing an event at the chart.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub invoked: usize,
    pub errors: Vec<SandboxError>,
}

pub struct ChartInstance {
    option: Map<String, Value>,
    width: u32,
    height: u32,
    loading: bool,
    listeners: Vec<(String, Listener)>,
    disposed: bool,
}

impl std::fmt::Debug for ChartInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartInstance")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("loading", &self.loading)
            .field("listeners", &self.listeners.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Merge `patch` into `target`. Maps merge by key; a `data` entry is always
/// replaced whole. Arrays of maps merge item by item and keep extra items;
/// any other array, and any other value, is replaced.
fn merge_value(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src {
                match dst.get_mut(&key) {
                    Some(existing) if key != "data" => merge_value(existing, value),
                    _ => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) if src.iter().all(Value::is_object) => {
            for (i, value) in src.into_iter().enumerate() {
                match dst.get_mut(i) {
                    Some(existing) => merge_value(existing, value),
                    None => dst.push(value),
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[derive(Clone, Debug)]
pub struct ChartHandle(Rc<RefCell<ChartInstance>>);

impl ChartHandle {
    pub fn new(width: u32, height: u32) -> Self {
        Self(Rc::new(RefCell::new(ChartInstance {
            option: Map::new(),
            width,
            height,
            loading: false,
            listeners: Vec::new(),
            disposed: false,
        })))
    }

    /// True when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &ChartHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn ensure_live(&self) -> Result<(), String> {
        if self.0.borrow().disposed {
            return Err("chart instance has been disposed".to_string());
        }
        Ok(())
    }

    pub fn set_option(&self, option: Value, not_merge: bool) -> Result<(), String> {
        self.ensure_live()?;
        let Value::Object(incoming) = option else {
            return Err("setOption expects an option map".to_string());
        };
        let mut chart = self.0.borrow_mut();
        if not_merge {
            chart.option = incoming;
        } else {
            let mut current = Value::Object(std::mem::take(&mut chart.option));
            merge_value(&mut current, Value::Object(incoming));
            if let Value::Object(merged) = current {
                chart.option = merged;
            }
        }
        Ok(())
    }

    pub fn option(&self) -> Value {
        Value::Object(self.0.borrow().option.clone())
    }

    /// Remove all components and series. Listeners stay registered.
    pub fn clear(&self) -> Result<(), String> {
        self.ensure_live()?;
        self.0.borrow_mut().option.clear();
        Ok(())
    }

    pub fn resize(&self, width: Option<u32>, height: Option<u32>) -> Result<(), String> {
        self.ensure_live()?;
        if width == Some(0) || height == Some(0) {
            return Err("resize dimensions must be positive".to_string());
        }
        let mut chart = self.0.borrow_mut();
        if let Some(w) = width {
            chart.width = w;
        }
        if let Some(h) = height {
            chart.height = h;
        }
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        let chart = self.0.borrow();
        (chart.width, chart.height)
    }

    pub fn set_loading(&self, loading: bool) -> Result<(), String> {
        self.ensure_live()?;
        self.0.borrow_mut().loading = loading;
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.0.borrow().loading
    }

    pub fn on(&self, event: &str, listener: Listener) -> Result<(), String> {
        self.ensure_live()?;
        self.0
            .borrow_mut()
            .listeners
            .push((event.to_string(), listener));
        Ok(())
    }

    /// Remove every listener for `event`, returning how many were removed.
    pub fn off(&self, event: &str) -> Result<usize, String> {
        self.ensure_live()?;
        let mut chart = self.0.borrow_mut();
        let before = chart.listeners.len();
        chart.listeners.retain(|(name, _)| name != event);
        Ok(before - chart.listeners.len())
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.0
            .borrow()
            .listeners
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Fire `event` at every listener registered for it. Listeners may call
    /// back into the chart, so none of them run while it is borrowed.
    pub fn dispatch(&self, event: &str, params: &Value) -> DispatchOutcome {
        let listeners: Vec<Listener> = {
            let chart = self.0.borrow();
            if chart.disposed {
                return DispatchOutcome::default();
            }
            chart
                .listeners
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        let mut outcome = DispatchOutcome::default();
        for listener in listeners {
            outcome.invoked += 1;
            if let Err(err) = listener(params) {
                outcome.errors.push(err);
            }
        }
        outcome
    }

    /// Params for a click on `data_index` of series `series_index`, shaped like
    /// the library's mouse event params. `None` if there is no such data item.
    pub fn click_params(&self, series_index: usize, data_index: usize) -> Option<Value> {
        let chart = self.0.borrow();
        let series = match chart.option.get("series")? {
            Value::Array(items) => items.get(series_index)?,
            single @ Value::Object(_) if series_index == 0 => single,
            _ => return None,
        };
        let data = series.get("data")?.as_array()?.get(data_index)?.clone();
        let value = match &data {
            Value::Object(item) => item.get("value").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let axis = match chart.option.get("xAxis") {
            Some(Value::Array(axes)) => axes.first(),
            other => other,
        };
        let name = axis
            .and_then(|a| a.get("data"))
            .and_then(|d| d.get(data_index))
            .cloned()
            .unwrap_or(Value::Null);

        Some(serde_json::json!({
            "componentType": "series",
            "seriesType": series.get("type").cloned().unwrap_or(Value::Null),
            "seriesIndex": series_index,
            "seriesName": series.get("name").cloned().unwrap_or(Value::Null),
            "dataIndex": data_index,
            "name": name,
            "data": data,
            "value": value,
        }))
    }

    /// Render a static snapshot. Reads the chart state only.
    pub fn snapshot(&self, request: &ImageRequest) -> Result<EncodedImage, String> {
        self.ensure_live()?;
        let (option, width, height) = {
            let chart = self.0.borrow();
            (Value::Object(chart.option.clone()), chart.width, chart.height)
        };
        let canvas = raster::rasterize(&option, width, height, request)?;
        raster::encode(canvas, request.format).map_err(|e| e.to_string())
    }

    pub fn data_url(&self, request: &ImageRequest) -> Result<String, String> {
        Ok(self.snapshot(request)?.data_url())
    }

    /// Tear the instance down. Only the host calls this, on unmount.
    pub(crate) fn dispose(&self) {
        let mut chart = self.0.borrow_mut();
        chart.disposed = true;
        chart.listeners.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().disposed
    }
}
