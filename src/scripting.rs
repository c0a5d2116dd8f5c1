//! Rhai scripting integration for the sandbox.
//!
//! Scripts run as a plain statement list with exactly two variables in scope:
//! - `myChart` - the live chart instance
//! - `echarts` - the library namespace
//!
//! Chart methods:
//! - `myChart.setOption(option)`, `myChart.setOption(option, notMerge)`
//! - `myChart.getOption()`
//! - `myChart.on(eventName, callback)`, `myChart.off(eventName)`
//! - `myChart.resize()`, `myChart.resize(#{ width, height })`
//! - `myChart.getWidth()`, `myChart.getHeight()`
//! - `myChart.clear()`, `myChart.showLoading()`, `myChart.hideLoading()`
//! - `myChart.getDataURL()`, `myChart.getDataURL(#{ type, pixelRatio, backgroundColor })`
//!
//! Namespace members:
//! - `echarts.color`, `echarts.version`
//! - `echarts.themes()`, `echarts.theme(name)`
//! - `echarts.lift(color, level)`
//!
//! `print(..)` and `debug(..)` go to the script log.
//!
//! No operation, depth or size limits are configured: a script that never
//! returns blocks its caller.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, Scope, AST, FLOAT, INT};
use serde_json::Value;

use crate::chart::{ChartHandle, Listener};
use crate::error::SandboxError;
use crate::evaluator::{EvalError, EvaluationScope, Evaluator, CHART_BINDING, NAMESPACE_BINDING};
use crate::namespace::ChartsNamespace;
use crate::raster::ImageRequest;
use crate::script_diagnostics::{from_eval_error, from_parse_error, ScriptPhase};
use crate::script_log::{register_output_hooks, reset_attempt_log_count};

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// AST of the script currently running, needed to call back into closures later.
type CurrentAst = Rc<RefCell<Option<Rc<AST>>>>;

fn to_json(value: Dynamic) -> HostResult<Value> {
    rhai::serde::from_dynamic(&value)
}

fn from_json(value: &Value) -> HostResult<Dynamic> {
    rhai::serde::to_dynamic(value)
}

fn dimension(map: &Map, key: &str) -> HostResult<Option<u32>> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    let number = if let Ok(i) = value.as_int() {
        i as f64
    } else if let Ok(f) = value.as_float() {
        f as f64
    } else {
        return Err(format!("resize {} must be a number", key).into());
    };
    if !(number >= 1.0 && number <= u32::MAX as f64) {
        return Err(format!("resize {} out of range: {}", key, number).into());
    }
    Ok(Some(number.round() as u32))
}

/// Wrap a script callback so the chart can call it after the run has finished.
/// While it runs, `current_ast` points at the AST the callback came from, so
/// the callback can itself register listeners.
fn script_listener(engine: Weak<Engine>, current_ast: CurrentAst, ast: Rc<AST>, callback: FnPtr) -> Listener {
    Rc::new(move |params: &Value| -> Result<(), SandboxError> {
        let engine = engine
            .upgrade()
            .ok_or_else(|| EvalError::runtime("script engine is no longer available"))?;
        let to_error = |err: Box<EvalAltResult>| -> SandboxError {
            EvalError::from(from_eval_error(ScriptPhase::Listener, &err)).into()
        };
        let params = from_json(params).map_err(to_error)?;

        reset_attempt_log_count();
        let outer = current_ast.replace(Some(ast.clone()));
        let result = callback.call::<Dynamic>(&engine, &ast, (params,));
        current_ast.replace(outer);
        result.map(|_| ()).map_err(to_error)
    })
}

fn register_chart_api(engine: &mut Engine, engine_ref: Weak<Engine>, current_ast: CurrentAst) {
    engine.register_type_with_name::<ChartHandle>("Chart");

    engine.register_fn("to_string", |chart: &mut ChartHandle| -> String {
        let (w, h) = chart.size();
        format!("Chart({}x{})", w, h)
    });

    // === Option ===
    engine.register_fn("setOption", |chart: &mut ChartHandle, option: Map| -> HostResult<()> {
        let option = to_json(Dynamic::from_map(option))?;
        chart.set_option(option, false).map_err(Into::into)
    });
    engine.register_fn(
        "setOption",
        |chart: &mut ChartHandle, option: Map, not_merge: bool| -> HostResult<()> {
            let option = to_json(Dynamic::from_map(option))?;
            chart.set_option(option, not_merge).map_err(Into::into)
        },
    );
    engine.register_fn("getOption", |chart: &mut ChartHandle| -> HostResult<Dynamic> {
        from_json(&chart.option())
    });
    engine.register_fn("clear", |chart: &mut ChartHandle| -> HostResult<()> {
        chart.clear().map_err(Into::into)
    });

    // === Events ===
    engine.register_fn(
        "on",
        move |chart: &mut ChartHandle, event: ImmutableString, callback: FnPtr| -> HostResult<()> {
            let ast = current_ast
                .borrow()
                .clone()
                .ok_or("myChart.on called outside a script run")?;
            let listener = script_listener(engine_ref.clone(), current_ast.clone(), ast, callback);
            chart.on(event.as_str(), listener).map_err(Into::into)
        },
    );
    engine.register_fn("off", |chart: &mut ChartHandle, event: ImmutableString| -> HostResult<INT> {
        chart
            .off(event.as_str())
            .map(|removed| removed as INT)
            .map_err(Into::into)
    });

    // === Size ===
    engine.register_fn("resize", |chart: &mut ChartHandle| -> HostResult<()> {
        chart.resize(None, None).map_err(Into::into)
    });
    engine.register_fn("resize", |chart: &mut ChartHandle, size: Map| -> HostResult<()> {
        let width = dimension(&size, "width")?;
        let height = dimension(&size, "height")?;
        chart.resize(width, height).map_err(Into::into)
    });
    engine.register_fn("getWidth", |chart: &mut ChartHandle| chart.size().0 as INT);
    engine.register_fn("getHeight", |chart: &mut ChartHandle| chart.size().1 as INT);

    // === Loading ===
    engine.register_fn("showLoading", |chart: &mut ChartHandle| -> HostResult<()> {
        chart.set_loading(true).map_err(Into::into)
    });
    engine.register_fn("hideLoading", |chart: &mut ChartHandle| -> HostResult<()> {
        chart.set_loading(false).map_err(Into::into)
    });
    engine.register_fn("isDisposed", |chart: &mut ChartHandle| chart.is_disposed());

    // === Export ===
    engine.register_fn("getDataURL", |chart: &mut ChartHandle| -> HostResult<String> {
        chart.data_url(&ImageRequest::default()).map_err(Into::into)
    });
    engine.register_fn("getDataURL", |chart: &mut ChartHandle, options: Map| -> HostResult<String> {
        let request = ImageRequest::from_options(&to_json(Dynamic::from_map(options))?)?;
        chart.data_url(&request).map_err(Into::into)
    });
}

fn register_namespace_api(engine: &mut Engine) {
    engine.register_type_with_name::<ChartsNamespace>("ECharts");

    engine.register_get("color", |ns: &mut ChartsNamespace| -> Array {
        ns.palette().iter().map(|c| Dynamic::from(c.to_string())).collect()
    });
    engine.register_get("version", |ns: &mut ChartsNamespace| ns.version().to_string());
    engine.register_fn("themes", |ns: &mut ChartsNamespace| -> Array {
        ns.theme_names().iter().map(|t| Dynamic::from(t.to_string())).collect()
    });
    engine.register_fn("theme", |ns: &mut ChartsNamespace, name: ImmutableString| -> HostResult<Dynamic> {
        match ns.theme(name.as_str()) {
            Some(theme) => from_json(&theme),
            None => Ok(Dynamic::UNIT),
        }
    });
    engine.register_fn(
        "lift",
        |ns: &mut ChartsNamespace, color: ImmutableString, level: FLOAT| -> HostResult<String> {
            ns.lift(color.as_str(), level as f64).map_err(Into::into)
        },
    );
    engine.register_fn(
        "lift",
        |ns: &mut ChartsNamespace, color: ImmutableString, level: INT| -> HostResult<String> {
            ns.lift(color.as_str(), level as f64).map_err(Into::into)
        },
    );
}

/// Rhai-backed [`Evaluator`].
pub struct RhaiEvaluator {
    engine: Rc<Engine>,
    current_ast: CurrentAst,
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        let current_ast: CurrentAst = Rc::new(RefCell::new(None));
        let engine = Rc::new_cyclic(|engine_ref: &Weak<Engine>| {
            let mut engine = Engine::new();
            register_output_hooks(&mut engine);
            register_chart_api(&mut engine, engine_ref.clone(), current_ast.clone());
            register_namespace_api(&mut engine);
            engine
        });

        Self {
            engine,
            current_ast,
        }
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for RhaiEvaluator {
    fn evaluate(&self, source: &str, bindings: EvaluationScope) -> Result<(), EvalError> {
        reset_attempt_log_count();

        let ast = self
            .engine
            .compile(source)
            .map_err(|err| EvalError::from(from_parse_error(&err)))?;
        let ast = Rc::new(ast);

        let mut scope = Scope::new();
        scope.push(CHART_BINDING, bindings.chart);
        scope.push(NAMESPACE_BINDING, bindings.namespace);

        self.current_ast.replace(Some(ast.clone()));
        let result = self.engine.run_ast_with_scope(&mut scope, &ast);
        self.current_ast.replace(None);

        result.map_err(|err| EvalError::from(from_eval_error(ScriptPhase::Run, &err)))
    }
}
