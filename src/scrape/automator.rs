//! Query-builder automation.
//!
//! The portal exposes no API; the only way to obtain an extract is to
//! drive its query-builder UI through a fixed sequence of steps ending
//! in a download click. The sequence is an ordered state machine — a
//! step that fails after its retries fails the whole job, and the next
//! job starts over with a fresh browser session. All selectors and JS
//! snippets live here; nothing outside this module touches the remote
//! UI.

use anyhow::{anyhow, Result};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::JobError;

pub const PORTAL_URL: &str = "https://survstat.rki.de/Content/Query/Create.aspx";

const ADD_FILTER_XPATH: &str = "//input[@title='Add']";
const SELECT_AN_OPTION_XPATH: &str = "//*[contains(text(), 'Select an option')]";
const DISEASE_DIMENSION_XPATH: &str = "//li[contains(text(), 'Disease/ Pathogen')]";
const DISEASE_PICKER_XPATH: &str = "//select[@title='Reporting category by disease name']\
/following-sibling::div[contains(@class, 'chosen-container')]";
const YEAR_DIMENSION_XPATH: &str = "//li[contains(text(), 'Year of notification')]";
const YEAR_PICKER_XPATH: &str =
    "//span[text()='Year of notification']/../..//div[contains(@class, 'chosen-container')]";

const ZERO_FILL_CHECKBOX: &str =
    "#ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_CheckBoxNonEmpty";
const QUERY_RESULT_LABEL: &str =
    "#ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_LabelQueryResultInfo";
const DOWNLOAD_BUTTON: &str =
    "#ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_ButtonDownload";

/// The row/column selects are chosen.js widgets; setting them needs a
/// value assignment plus change + chosen:updated events, which a plain
/// click sequence cannot produce reliably.
const SET_ROW_DIMENSION_JS: &str = r#"
var rowsSelect = document.getElementById('ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_DropDownListRowHierarchy');
rowsSelect.value = '[ReportingDate].[Week]';
rowsSelect.dispatchEvent(new Event('change'));
if (typeof $ !== 'undefined' && $(rowsSelect).data('chosen')) {
    $(rowsSelect).trigger('chosen:updated');
}
"#;

const SET_COLUMN_DIMENSION_JS: &str = r#"
var columnsSelect = document.getElementById('ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_DropDownListColHierarchy');
columnsSelect.value = '[DeutschlandNodes].[Kreise71Web]';
columnsSelect.dispatchEvent(new Event('change'));
if (typeof $ !== 'undefined' && $(columnsSelect).data('chosen')) {
    $(columnsSelect).trigger('chosen:updated');
}
"#;

const SET_COLUMN_VALUE_JS: &str = r#"
var colSelect = document.getElementById('ContentPlaceHolderMain_ContentPlaceHolderAltGridFull_DropDownListCol');
colSelect.value = '[DeutschlandNodes].[Kreise71Web].[CountyKey71]';
colSelect.dispatchEvent(new Event('change'));
if (typeof $ !== 'undefined' && $(colSelect).data('chosen')) {
    $(colSelect).trigger('chosen:updated');
}
"#;

/// Ordered steps of the query-builder sequence. Names appear in
/// `StepFailed` errors and per-job logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    OpenPage,
    AddDiseaseFilter,
    SelectDisease,
    AddYearFilter,
    SelectYear,
    ConfigureRowDimension,
    ConfigureColumnDimension,
    ConfigureColumnValue,
    EnableZeroFill,
    AwaitQueryResult,
    TriggerDownload,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::OpenPage => "open_page",
            Step::AddDiseaseFilter => "add_disease_filter",
            Step::SelectDisease => "select_disease",
            Step::AddYearFilter => "add_year_filter",
            Step::SelectYear => "select_year",
            Step::ConfigureRowDimension => "configure_row_dimension",
            Step::ConfigureColumnDimension => "configure_column_dimension",
            Step::ConfigureColumnValue => "configure_column_value",
            Step::EnableZeroFill => "enable_zero_fill",
            Step::AwaitQueryResult => "await_query_result",
            Step::TriggerDownload => "trigger_download",
        }
    }
}

/// Bounded retry for steps that race against dynamically rendered
/// controls: each attempt is preceded by a short wait, because the
/// control may not be attached to the page when first queried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it yields a value or the attempts are exhausted.
    pub fn run<T, F>(&self, mut op: F) -> Option<T>
    where
        F: FnMut() -> Option<T>,
    {
        for attempt in 1..=self.max_attempts {
            thread::sleep(self.delay);
            if let Some(value) = op() {
                return Some(value);
            }
            debug!(attempt, max = self.max_attempts, "retrying step operation");
        }
        None
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_secs(1))
    }
}

pub struct WebFormAutomator {
    // Browser is held so the session (and any in-flight download)
    // outlives the final step.
    _browser: Browser,
    tab: Arc<Tab>,
    retry: RetryPolicy,
}

impl WebFormAutomator {
    /// Launch a fresh browser session routing downloads into
    /// `downloads_dir`. One session serves exactly one job.
    pub fn launch(downloads_dir: &Path) -> Result<Self, JobError> {
        let in_container = Path::new("/.dockerenv").exists();
        let options = LaunchOptions::default_builder()
            .sandbox(!in_container)
            .idle_browser_timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow!("building browser launch options: {e}"))?;
        let browser =
            Browser::new(options).map_err(|e| anyhow!("launching headless browser: {e}"))?;
        let tab = browser
            .new_tab()
            .map_err(|e| anyhow!("opening browser tab: {e}"))?;
        tab.set_default_timeout(Duration::from_secs(10));

        tab.call_method(Page::SetDownloadBehavior {
            behavior: Page::SetDownloadBehaviorBehaviorOption::Allow,
            download_path: Some(downloads_dir.to_string_lossy().into_owned()),
        })
        .map_err(|e| anyhow!("setting download directory: {e}"))?;

        Ok(WebFormAutomator {
            _browser: browser,
            tab,
            retry: RetryPolicy::default(),
        })
    }

    /// Drive the full sequence for one (disease, year). On success the
    /// download has been triggered exactly once and the archive is on
    /// its way into the downloads directory.
    pub fn run(&self, disease_remote_name: &str, year: &str) -> Result<(), JobError> {
        self.open_page()?;
        self.add_disease_filter()?;
        self.select_disease(disease_remote_name)?;
        self.add_year_filter()?;
        self.select_year(year)?;
        self.run_js(Step::ConfigureRowDimension, SET_ROW_DIMENSION_JS)?;
        self.run_js(Step::ConfigureColumnDimension, SET_COLUMN_DIMENSION_JS)?;
        self.run_js(Step::ConfigureColumnValue, SET_COLUMN_VALUE_JS)?;
        self.enable_zero_fill()?;
        self.await_query_result()?;
        self.trigger_download()?;
        Ok(())
    }

    fn fail(step: Step) -> JobError {
        JobError::StepFailed(step.name().to_string())
    }

    fn open_page(&self) -> Result<(), JobError> {
        let nav = self
            .tab
            .navigate_to(PORTAL_URL)
            .and_then(|t| t.wait_until_navigated());
        if let Err(e) = nav {
            warn!(step = Step::OpenPage.name(), error = %e, "navigation failed");
            return Err(Self::fail(Step::OpenPage));
        }
        thread::sleep(Duration::from_secs(2));
        Ok(())
    }

    /// Click the first filter add-button, then the freshly rendered
    /// "Select an option" dropdown, then the disease dimension entry.
    fn add_disease_filter(&self) -> Result<(), JobError> {
        let step = Step::AddDiseaseFilter;
        self.click_xpath(step, ADD_FILTER_XPATH)?;
        thread::sleep(Duration::from_secs(1));
        self.click_rendered_option(step)?;
        thread::sleep(Duration::from_secs(1));
        self.click_xpath(step, DISEASE_DIMENSION_XPATH)
    }

    fn select_disease(&self, disease_remote_name: &str) -> Result<(), JobError> {
        let step = Step::SelectDisease;
        self.click_xpath(step, DISEASE_PICKER_XPATH)?;
        let option = format!("//li[contains(text(), '{disease_remote_name}')]");
        self.click_xpath(step, &option)
    }

    /// The second add-button is re-rendered after the disease filter is
    /// applied, so both the button and the dropdown need the retry.
    fn add_year_filter(&self) -> Result<(), JobError> {
        let step = Step::AddYearFilter;
        let clicked = self.retry.run(|| {
            let button = self.tab.wait_for_xpath(ADD_FILTER_XPATH).ok()?;
            button.click().ok().map(|_| ())
        });
        if clicked.is_none() {
            return Err(Self::fail(step));
        }
        thread::sleep(Duration::from_secs(1));
        self.click_rendered_option(step)?;
        thread::sleep(Duration::from_secs(1));
        self.click_xpath(step, YEAR_DIMENSION_XPATH)
    }

    fn select_year(&self, year: &str) -> Result<(), JobError> {
        let step = Step::SelectYear;
        self.click_xpath(step, YEAR_PICKER_XPATH)?;
        let option = format!("//li[text()='{year}']");
        self.click_xpath(step, &option)
    }

    fn enable_zero_fill(&self) -> Result<(), JobError> {
        let step = Step::EnableZeroFill;
        let checkbox = self
            .tab
            .wait_for_element(ZERO_FILL_CHECKBOX)
            .map_err(|_| Self::fail(step))?;
        let args: Vec<serde_json::Value> = Vec::new();
        let checked = checkbox
            .call_js_fn("function() { return this.checked; }", args, false)
            .ok()
            .map(|obj| remote_bool(obj.value))
            .unwrap_or(false);
        if !checked {
            checkbox.click().map_err(|_| Self::fail(step))?;
            thread::sleep(Duration::from_secs(1));
        }
        Ok(())
    }

    /// The query result renders server-side; the info label appearing
    /// is the completion signal. Longer budget than the element waits.
    fn await_query_result(&self) -> Result<(), JobError> {
        self.tab
            .wait_for_element_with_custom_timeout(QUERY_RESULT_LABEL, Duration::from_secs(30))
            .map_err(|_| Self::fail(Step::AwaitQueryResult))?;
        Ok(())
    }

    /// Must run exactly once per job; the caller never retries it.
    fn trigger_download(&self) -> Result<(), JobError> {
        let step = Step::TriggerDownload;
        let button = self
            .tab
            .wait_for_element(DOWNLOAD_BUTTON)
            .map_err(|_| Self::fail(step))?;
        button.click().map_err(|_| Self::fail(step))?;
        Ok(())
    }

    fn click_xpath(&self, step: Step, xpath: &str) -> Result<(), JobError> {
        let element = self
            .tab
            .wait_for_xpath(xpath)
            .map_err(|_| Self::fail(step))?;
        element.click().map_err(|_| Self::fail(step))?;
        Ok(())
    }

    /// Click the first visible "Select an option" control. Several may
    /// be in the DOM; hidden ones have no box model and are skipped.
    fn click_rendered_option(&self, step: Step) -> Result<(), JobError> {
        self.retry
            .run(|| {
                let candidates = self.tab.find_elements_by_xpath(SELECT_AN_OPTION_XPATH).ok()?;
                candidates
                    .iter()
                    .find(|el| Self::is_visible(el))
                    .and_then(|el| el.click().ok().map(|_| ()))
            })
            .ok_or_else(|| Self::fail(step))
    }

    fn is_visible(element: &Element) -> bool {
        element.get_box_model().is_ok()
    }

    fn run_js(&self, step: Step, script: &str) -> Result<(), JobError> {
        self.tab
            .evaluate(script, false)
            .map_err(|_| Self::fail(step))?;
        thread::sleep(Duration::from_secs(1));
        Ok(())
    }
}

/// A CDP remote object's value is only a boolean when the evaluated
/// function actually returned one; anything else reads as false.
fn remote_bool(value: Option<serde_json::Value>) -> bool {
    value.and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_succeeds_within_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut attempts = 0;
        let result = policy.run(|| {
            attempts += 1;
            (attempts == 2).then_some(attempts)
        });
        assert_eq!(result, Some(2));
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut attempts = 0;
        let result: Option<()> = policy.run(|| {
            attempts += 1;
            None
        });
        assert_eq!(result, None);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(Step::AddDiseaseFilter.name(), "add_disease_filter");
        assert_eq!(Step::TriggerDownload.name(), "trigger_download");
    }

    #[test]
    fn remote_bool_only_trusts_real_booleans() {
        assert!(remote_bool(Some(serde_json::json!(true))));
        assert!(!remote_bool(Some(serde_json::json!(false))));
        assert!(!remote_bool(Some(serde_json::json!("true"))));
        assert!(!remote_bool(Some(serde_json::json!(1))));
        assert!(!remote_bool(None));
    }
}
