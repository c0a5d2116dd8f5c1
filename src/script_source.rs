//! The script being edited.

/// Script a fresh session starts with.
pub const DEFAULT_SCRIPT: &str = r##"// myChart is the live chart instance; call its methods directly.
// echarts is the library namespace: palettes, themes and helpers.

// Build the chart option
let option = #{
    // Title
    title: #{
        text: "ECharts sample",
        subtext: "Using myChart and echarts"
    },
    // Tooltip
    tooltip: #{
        trigger: "axis"
    },
    // X axis
    xAxis: #{
        "type": "category",
        data: ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
    },
    // Y axis
    yAxis: #{
        "type": "value"
    },
    // Series
    series: [#{
        data: [120, 200, 150, 80, 70, 110, 130],
        "type": "bar",
        showBackground: true,
        backgroundStyle: #{
            color: "rgba(180, 180, 180, 0.2)"
        }
    }]
};

// Apply it with setOption
myChart.setOption(option);

// React to clicks on the chart
myChart.on("click", |params| {
    // params describes the clicked item
    print(`clicked: ${params.name} = ${params.value}`);
});

// The default palette from the library namespace
print(`palette: ${echarts.color}`);

/*
More myChart methods:
- myChart.setOption(option, notMerge): replace instead of merge
- myChart.getOption(): current option
- myChart.resize() / myChart.resize(#{ width: 400, height: 300 })
- myChart.showLoading() / myChart.hideLoading()
- myChart.clear(): remove all components and series
- myChart.getDataURL(#{ "type": "png", pixelRatio: 2 })

More echarts members:
- echarts.version
- echarts.themes() / echarts.theme("dark")
- echarts.lift("#5470c6", 0.3)
*/
"##;

/// Current script text. Replaced wholesale on every edit.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    text: String,
    revision: u64,
}

impl Default for ScriptSource {
    fn default() -> Self {
        Self::new(DEFAULT_SCRIPT)
    }
}

impl ScriptSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            revision: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of edits committed since the session started.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn replace(&mut self, text: impl Into<String>) -> &str {
        self.text = text.into();
        self.revision += 1;
        &self.text
    }

    pub fn reset(&mut self) -> &str {
        self.replace(DEFAULT_SCRIPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_source() {
        let source = ScriptSource::default();
        assert_eq!(source.text(), DEFAULT_SCRIPT);
        assert_eq!(source.revision(), 0);
    }

    #[test]
    fn test_default_script_is_complete() {
        // Hex colors in the method list must not end the literal early
        assert!(DEFAULT_SCRIPT.contains(r##"echarts.lift("#5470c6", 0.3)"##));
        assert!(DEFAULT_SCRIPT.trim_end().ends_with("*/"));
        assert!(DEFAULT_SCRIPT.starts_with("// myChart is the live chart instance"));
    }

    #[test]
    fn test_replace_bumps_revision() {
        let mut source = ScriptSource::default();
        source.replace("myChart.clear();");
        assert_eq!(source.text(), "myChart.clear();");
        source.reset();
        assert_eq!(source.text(), DEFAULT_SCRIPT);
        assert_eq!(source.revision(), 2);
    }
}
