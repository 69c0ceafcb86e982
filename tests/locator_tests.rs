use fieldctl::{
    ByUi, CaptureTarget, DetectionResponse, DetectionSettings, ElementType, Error, Field,
    FieldDetector, InputDriver, Label, MouseButton, Rect, ScreenCapture, SessionContext,
    UiElement,
};
use image::{DynamicImage, GrayImage, Luma};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capture collaborator backed by pre-built images.
struct FakeCapture {
    page: DynamicImage,
    screen: DynamicImage,
    fail: bool,
}

impl FakeCapture {
    /// A textured page embedded into a flat desktop at `offset`, so the
    /// viewport-offset template match resolves to a known translation.
    fn with_offset(offset: (u32, u32)) -> Self {
        let mut rng = StdRng::seed_from_u64(99);
        let mut page = GrayImage::new(200, 120);
        for y in 0..page.height() {
            for x in 0..page.width() {
                let value = if rng.gen_bool(0.5) { 255 } else { 0 };
                page.put_pixel(x, y, Luma([value]));
            }
        }
        let mut screen = GrayImage::from_pixel(500, 400, Luma([128]));
        for (x, y, pixel) in page.enumerate_pixels() {
            screen.put_pixel(offset.0 + x, offset.1 + y, *pixel);
        }
        Self {
            page: DynamicImage::ImageLuma8(page),
            screen: DynamicImage::ImageLuma8(screen),
            fail: false,
        }
    }

    fn failing() -> Self {
        let mut capture = Self::with_offset((0, 0));
        capture.fail = true;
        capture
    }
}

impl ScreenCapture for FakeCapture {
    fn capture(&self, target: CaptureTarget) -> fieldctl::Result<DynamicImage> {
        if self.fail {
            return Err(Error::ScreenshotFailed("capture backend down".into()));
        }
        Ok(match target {
            CaptureTarget::Page => self.page.clone(),
            CaptureTarget::MainScreen => self.screen.clone(),
        })
    }
}

/// Detection collaborator returning a fixed response, counting calls.
struct FakeDetector {
    response: DetectionResponse,
    calls: AtomicUsize,
}

impl FakeDetector {
    fn new(response: DetectionResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FieldDetector for FakeDetector {
    fn detect(&self, _image: &DynamicImage) -> fieldctl::Result<DetectionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Click(i32, i32, &'static str),
    DoubleClick(i32, i32),
    Text(String),
    Key(String),
    ScrollTo(i32, i32),
}

/// Input collaborator recording every action.
struct FakeDriver {
    actions: Mutex<Vec<Action>>,
    scroll: (i32, i32),
}

impl FakeDriver {
    fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            scroll: (0, 0),
        }
    }

    fn scrolled(scroll: (i32, i32)) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            scroll,
        }
    }

    fn recorded(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }
}

impl InputDriver for FakeDriver {
    fn click_at(&self, x: i32, y: i32, button: MouseButton) -> fieldctl::Result<()> {
        let name = match button {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        };
        self.actions.lock().unwrap().push(Action::Click(x, y, name));
        Ok(())
    }

    fn double_click_at(&self, x: i32, y: i32) -> fieldctl::Result<()> {
        self.actions.lock().unwrap().push(Action::DoubleClick(x, y));
        Ok(())
    }

    fn send_text(&self, text: &str) -> fieldctl::Result<()> {
        self.actions.lock().unwrap().push(Action::Text(text.into()));
        Ok(())
    }

    fn send_key(&self, key: &str) -> fieldctl::Result<()> {
        self.actions.lock().unwrap().push(Action::Key(key.into()));
        Ok(())
    }

    fn scroll_to(&self, x: i32, y: i32) -> fieldctl::Result<()> {
        self.actions.lock().unwrap().push(Action::ScrollTo(x, y));
        Ok(())
    }

    fn scroll_position(&self) -> fieldctl::Result<(i32, i32)> {
        Ok(self.scroll)
    }
}

fn seeded_context() -> Arc<SessionContext> {
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::with_offset((0, 0))),
        Arc::new(FakeDetector::new(DetectionResponse::default())),
        DetectionSettings::default(),
    ));
    context.seed_page(
        "page1",
        vec![Field::new(Rect::new(200, 100, 100, 20), "field")],
        vec![Label::new(Rect::new(100, 100, 50, 20), "Name")],
        (0, 0),
    );
    context
}

#[test]
fn resolves_field_right_of_label() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        driver,
    );

    let rect = element.find_element().unwrap();
    assert_eq!(rect, Rect::new(200, 100, 100, 20));
    assert_eq!(element.detected_rectangle(), Some(rect));
    assert!(element.action_duration().is_some());
}

#[test]
fn missing_label_reports_criteria() {
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::with_offset((0, 0))),
        Arc::new(FakeDetector::new(DetectionResponse::default())),
        DetectionSettings::default(),
    ));
    context.seed_page("page1", vec![], vec![], (0, 0));

    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        driver,
    );

    let err = element.find_element().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    let message = err.to_string();
    assert!(message.contains("No label could be found"), "{}", message);
    assert!(
        message.contains("type=TEXT_FIELD, right_of=Name"),
        "{}",
        message
    );
}

#[test]
fn missing_field_reports_criteria() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    // label exists but no button satisfies the relation
    let mut element = UiElement::new(
        ByUi::new(ElementType::Button).right_of("Name"),
        "page1",
        context,
        driver,
    );

    let err = element.find_element().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("No field could be found"), "{}", message);
    assert!(message.contains("type=BUTTON"), "{}", message);
}

#[test]
fn query_without_type_is_rejected() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(ByUi::default().right_of("Name"), "page1", context, driver);
    let err = element.find_element().unwrap_err();
    assert!(err.to_string().contains("no element type"));
}

#[test]
fn query_without_predicate_is_rejected() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField),
        "page1",
        context,
        driver,
    );
    let err = element.find_element().unwrap_err();
    assert!(err.to_string().contains("no positional or text predicate"));
}

#[test]
fn related_field_overrides_interaction_rect() {
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::with_offset((0, 0))),
        Arc::new(FakeDetector::new(DetectionResponse::default())),
        DetectionSettings::default(),
    ));
    let inner = Field::new(Rect::new(260, 102, 30, 16), "field");
    let outer =
        Field::new(Rect::new(200, 100, 100, 20), "field_with_label").with_related_field(inner);
    context.seed_page(
        "page1",
        vec![outer],
        vec![Label::new(Rect::new(100, 100, 50, 20), "Name")],
        (0, 0),
    );

    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        driver,
    );
    assert_eq!(element.find_element().unwrap(), Rect::new(260, 102, 30, 16));
}

#[test]
fn click_scrolls_then_clicks_at_center() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        Arc::clone(&driver) as Arc<dyn InputDriver>,
    );

    element.click_at(0, 0).unwrap();
    // field (200,100,100,20): center (250, 110)
    assert_eq!(
        driver.recorded(),
        vec![Action::ScrollTo(250, 110), Action::Click(250, 110, "left")]
    );
}

#[test]
fn click_adjusts_for_scroll_position() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::scrolled((10, 30)));
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        Arc::clone(&driver) as Arc<dyn InputDriver>,
    );

    element.click_at(5, -2).unwrap();
    assert_eq!(
        driver.recorded(),
        vec![Action::ScrollTo(255, 108), Action::Click(245, 78, "left")]
    );
}

#[test]
fn send_keys_focuses_then_types() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        Arc::clone(&driver) as Arc<dyn InputDriver>,
    );

    element.send_keys("hello").unwrap();
    assert_eq!(
        driver.recorded(),
        vec![
            Action::ScrollTo(250, 110),
            Action::Click(250, 110, "left"),
            Action::Text("hello".into())
        ]
    );
}

#[test]
fn cache_population_translates_by_viewport_offset() {
    let response = DetectionResponse {
        fields: vec![fieldctl::page::DetectedBox {
            top: 30,
            left: 100,
            width: 60,
            height: 12,
            class_name: Some("field".into()),
            text: None,
            related_field: None,
        }],
        labels: vec![fieldctl::page::DetectedBox {
            top: 30,
            left: 40,
            width: 40,
            height: 12,
            class_name: None,
            text: Some("User".into()),
            related_field: None,
        }],
    };
    let detector = Arc::new(FakeDetector::new(response));
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::with_offset((37, 25))),
        Arc::clone(&detector) as Arc<dyn FieldDetector>,
        DetectionSettings::default(),
    ));

    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("User"),
        "login",
        Arc::clone(&context),
        driver,
    );

    let rect = element.find_element().unwrap();
    assert_eq!(rect, Rect::new(137, 55, 60, 12));
    assert_eq!(context.offset_for("login"), Some((37, 25)));
    assert_eq!(detector.call_count(), 1);

    // second resolution against the same origin reuses the cache
    element.find_element().unwrap();
    assert_eq!(detector.call_count(), 1);

    // explicit reset forces a fresh detection
    context.reset();
    element.find_element().unwrap();
    assert_eq!(detector.call_count(), 2);
}

#[test]
fn screenshot_failure_is_not_swallowed() {
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::failing()),
        Arc::new(FakeDetector::new(DetectionResponse::default())),
        DetectionSettings::default(),
    ));
    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        context,
        driver,
    );

    let err = element.find_element().unwrap_err();
    assert!(matches!(err, Error::ScreenshotFailed(_)));

    // is_element_present re-throws capture failures instead of polling
    let err = element.is_element_present(Duration::ZERO).unwrap_err();
    assert!(matches!(err, Error::ScreenshotFailed(_)));
}

#[test]
fn is_element_present_swallows_not_found() {
    let context = seeded_context();
    let driver = Arc::new(FakeDriver::new());
    let mut present = UiElement::new(
        ByUi::new(ElementType::TextField).right_of("Name"),
        "page1",
        Arc::clone(&context),
        Arc::clone(&driver) as Arc<dyn InputDriver>,
    );
    assert!(present.is_element_present(Duration::ZERO).unwrap());

    let mut absent = UiElement::new(
        ByUi::new(ElementType::Button).text("Submit"),
        "page1",
        context,
        driver,
    );
    assert!(!absent.is_element_present(Duration::ZERO).unwrap());
}

#[test]
fn text_criterion_matches_label_inside_button() {
    let context = Arc::new(SessionContext::new(
        Arc::new(FakeCapture::with_offset((0, 0))),
        Arc::new(FakeDetector::new(DetectionResponse::default())),
        DetectionSettings::default(),
    ));
    context.seed_page(
        "form",
        vec![
            Field::new(Rect::new(200, 100, 100, 20), "field"),
            Field::new(Rect::new(200, 200, 80, 30), "button"),
        ],
        vec![
            Label::new(Rect::new(100, 100, 50, 20), "Name"),
            Label::new(Rect::new(210, 205, 60, 20), "Submit"),
        ],
        (0, 0),
    );

    let driver = Arc::new(FakeDriver::new());
    let mut element = UiElement::new(
        ByUi::new(ElementType::Button).text("Sub.*"),
        "form",
        context,
        driver,
    );
    assert_eq!(element.find_element().unwrap(), Rect::new(200, 200, 80, 30));
}
