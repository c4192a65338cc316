use base64::Engine as _;
use serde_json::json;

use pinpress::render::headless::{PinRenderer, RendererConfig};
use pinpress::{DataRow, FieldMapping, PinImage, Template};

fn renderer() -> PinRenderer {
    PinRenderer::new(&RendererConfig::default())
}

fn render(template_json: serde_json::Value) -> PinImage {
    let template: Template = serde_json::from_value(template_json).unwrap();
    template.validate().unwrap();
    renderer()
        .render(&template, &DataRow::new(), &FieldMapping::new())
        .unwrap()
}

fn px(img: &PinImage, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * img.width + x) * 4) as usize;
    [img.data[i], img.data[i + 1], img.data[i + 2], img.data[i + 3]]
}

fn square(id: &str, z: i32, visible: bool, fill: &str) -> serde_json::Value {
    json!({
        "id": id, "type": "shape",
        "x": 8.0, "y": 8.0, "width": 48.0, "height": 48.0,
        "z_index": z, "visible": visible,
        "shape": "rect", "fill": fill
    })
}

#[test]
fn render_is_deterministic_and_premultiplied() {
    let t = json!({
        "width": 64, "height": 64, "background": "#000000",
        "elements": [square("a", 0, true, "#ff0000")]
    });
    let a = render(t.clone());
    let b = render(t);

    assert_eq!(a.width, 64);
    assert_eq!(a.height, 64);
    assert!(a.premultiplied);
    assert_eq!(a.data.len(), 64 * 64 * 4);
    assert_eq!(a.data, b.data);
}

#[test]
fn background_fills_uncovered_pixels() {
    let t = json!({
        "width": 16, "height": 16, "background": "#0000ff",
        "elements": []
    });
    let img = render(t);
    assert_eq!(px(&img, 8, 8), [0, 0, 255, 255]);
}

#[test]
fn higher_z_index_paints_on_top() {
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [square("red", 1, true, "#ff0000"), square("blue", 0, true, "#0000ff")]
    });
    let img = render(t);
    assert_eq!(px(&img, 32, 32), [255, 0, 0, 255]);

    // Swap the stacking: blue wins despite list order.
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [square("red", 0, true, "#ff0000"), square("blue", 1, true, "#0000ff")]
    });
    let img = render(t);
    assert_eq!(px(&img, 32, 32), [0, 0, 255, 255]);
}

#[test]
fn z_ties_keep_list_order() {
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [square("under", 0, true, "#ff0000"), square("over", 0, true, "#0000ff")]
    });
    let img = render(t);
    assert_eq!(px(&img, 32, 32), [0, 0, 255, 255]);
}

#[test]
fn invisible_elements_are_never_painted() {
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [square("hidden", 5, false, "#ff0000")]
    });
    let img = render(t);
    assert_eq!(px(&img, 32, 32), [255, 255, 255, 255]);
}

#[test]
fn opacity_multiplies_final_alpha() {
    let t = json!({
        "width": 64, "height": 64, "background": "#000000",
        "elements": [{
            "id": "half", "type": "shape",
            "x": 8.0, "y": 8.0, "width": 48.0, "height": 48.0,
            "opacity": 0.5, "shape": "rect", "fill": "#ffffff"
        }]
    });
    let img = render(t);
    let [r, _, _, _] = px(&img, 32, 32);
    // White at half opacity over black: mid gray, premultiplied.
    assert!((120..=135).contains(&r), "got {r}");
}

#[test]
fn missing_image_paints_marked_placeholder_and_row_succeeds() {
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [{
            "id": "img", "type": "image",
            "x": 8.0, "y": 8.0, "width": 48.0, "height": 48.0,
            "source": "/nope/missing.png", "fit": "cover"
        }]
    });
    let img = render(t);
    // Placeholder fill is a light gray, clearly not the white background.
    let [r, g, b, a] = px(&img, 32, 20);
    assert_eq!(a, 255);
    assert!(r < 250 && g < 250 && b < 250);
    assert_eq!(r, g);
    assert_eq!(g, b);
}

#[test]
fn data_uri_image_renders_with_cover_crop() {
    // 1x1 solid green PNG stretched over the box.
    let png = {
        let img = image::RgbaImage::from_raw(1, 1, vec![0, 255, 0, 255]).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    };
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    );

    let t = json!({
        "width": 32, "height": 32, "background": "#ffffff",
        "elements": [{
            "id": "img", "type": "image",
            "x": 0.0, "y": 0.0, "width": 32.0, "height": 32.0,
            "source": uri, "fit": "cover"
        }]
    });
    let img = render(t);
    assert_eq!(px(&img, 16, 16), [0, 255, 0, 255]);
}

#[test]
fn unresolvable_font_becomes_error_placeholder_not_row_failure() {
    // No font sources configured: the text element cannot resolve any font,
    // so it is replaced by the loud placeholder while the row still renders.
    let t = json!({
        "width": 64, "height": 64, "background": "#ffffff",
        "elements": [{
            "id": "t", "type": "text",
            "x": 8.0, "y": 8.0, "width": 48.0, "height": 48.0,
            "text": "Hello", "font_family": "Nope Grotesk"
        }]
    });
    let img = render(t);
    let [r, g, b, _] = px(&img, 32, 32);
    // Reddish tint fill, distinct from the white background.
    assert!(r > g && r > 200 && b < 250, "got {r},{g},{b}");
}

#[test]
fn dynamic_text_substitution_reaches_the_renderer() {
    // The text can't paint without fonts, but substitution must not be the
    // reason a row fails: the row still produces a surface.
    let template: Template = serde_json::from_value(json!({
        "width": 32, "height": 32, "background": "#ffffff",
        "elements": [{
            "id": "t", "type": "text",
            "x": 0.0, "y": 0.0, "width": 32.0, "height": 32.0,
            "dynamic": true, "field": "name", "text": ""
        }]
    }))
    .unwrap();

    let mut row = DataRow::new();
    row.insert("col".into(), "World".into());
    let mut mapping = FieldMapping::new();
    mapping.insert("name".into(), "col".into());

    let img = renderer().render(&template, &row, &mapping).unwrap();
    assert_eq!(img.width, 32);
}

#[test]
fn oversized_canvas_is_a_row_failure() {
    let template: Template = serde_json::from_value(json!({
        "width": 70000, "height": 32, "elements": []
    }))
    .unwrap();
    let err = renderer()
        .render(&template, &DataRow::new(), &FieldMapping::new())
        .unwrap_err();
    assert!(err.to_string().contains("row render error"));
}
