// src/utils/pdf.rs

//! Fixed-layout certificate renderer.
//!
//! Emits a minimal, self-contained single-page PDF (A4 landscape,
//! built-in Type1 fonts, one content stream). Keeping the writer in
//! the crate avoids pulling a document toolkit for what is a fixed
//! template with five lines of text.

/// Input for the certificate template.
#[derive(Debug, Clone)]
pub struct CertificateDocument {
    pub recipient: String,
    pub course_title: String,
    pub certificate_number: String,
    /// Issue date already formatted for display, e.g. "June 1, 2024".
    pub issued_on: String,
    pub verification_url: String,
}

const PAGE_WIDTH: f32 = 842.0; // A4 landscape, points
const PAGE_HEIGHT: f32 = 595.0;

/// Renders the certificate to PDF bytes. Pure; never fails.
pub fn render(doc: &CertificateDocument) -> Vec<u8> {
    let content = content_stream(doc);

    let objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
    ];

    let mut out: Vec<u8> = Vec::with_capacity(2048);
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    out
}

fn content_stream(doc: &CertificateDocument) -> String {
    let mut ops = String::new();

    // Double border.
    ops.push_str("2 w 0.2 0.2 0.2 RG\n");
    ops.push_str(&format!(
        "20 20 {} {} re S\n",
        PAGE_WIDTH - 40.0,
        PAGE_HEIGHT - 40.0
    ));
    ops.push_str("0.5 w\n");
    ops.push_str(&format!(
        "28 28 {} {} re S\n",
        PAGE_WIDTH - 56.0,
        PAGE_HEIGHT - 56.0
    ));

    centered_text(&mut ops, "F1", 36.0, 470.0, "Certificate of Completion");
    centered_text(&mut ops, "F2", 16.0, 410.0, "This certifies that");
    centered_text(&mut ops, "F1", 28.0, 365.0, &doc.recipient);
    centered_text(&mut ops, "F2", 16.0, 315.0, "has successfully completed the course");
    centered_text(&mut ops, "F1", 22.0, 270.0, &doc.course_title);
    centered_text(
        &mut ops,
        "F2",
        12.0,
        180.0,
        &format!("Certificate No. {}", doc.certificate_number),
    );
    centered_text(
        &mut ops,
        "F2",
        12.0,
        155.0,
        &format!("Issued on {}", doc.issued_on),
    );
    centered_text(
        &mut ops,
        "F2",
        10.0,
        110.0,
        &format!("Verify at {}", doc.verification_url),
    );

    ops
}

/// Centers a line horizontally using the average glyph width of the
/// built-in fonts, close enough for a fixed template.
fn centered_text(ops: &mut String, font: &str, size: f32, y: f32, text: &str) {
    let approx_width = text.chars().count() as f32 * size * 0.5;
    let x = ((PAGE_WIDTH - approx_width) / 2.0).max(40.0);
    ops.push_str(&format!(
        "BT /{} {} Tf {:.1} {:.1} Td ({}) Tj ET\n",
        font,
        size,
        x,
        y,
        escape(text)
    ));
}

/// Escapes the characters with meaning inside a PDF string literal.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => escaped.push(c),
            // Non-ASCII falls back to a placeholder; built-in fonts
            // only cover the standard Latin set.
            _ => escaped.push('?'),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CertificateDocument {
        CertificateDocument {
            recipient: "Ada Lovelace".to_string(),
            course_title: "Rust for Backends (2nd ed.)".to_string(),
            certificate_number: "CERT-ABCD1234-0000FFFF".to_string(),
            issued_on: "June 1, 2024".to_string(),
            verification_url: "https://learn.example.com/certificates/verify/CERT-ABCD1234-0000FFFF"
                .to_string(),
        }
    }

    #[test]
    fn renders_a_well_formed_pdf() {
        let bytes = render(&sample());
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));

        let text = String::from_utf8_lossy(&bytes);
        assert_eq!(text.matches("endobj").count(), 6);
        assert!(text.contains("startxref"));
    }

    #[test]
    fn embeds_the_certificate_fields() {
        let bytes = render(&sample());
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Ada Lovelace"));
        assert!(text.contains("CERT-ABCD1234-0000FFFF"));
        // Parentheses in the course title must be escaped.
        assert!(text.contains("Rust for Backends \\(2nd ed.\\)"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let bytes = render(&sample());
        let text = String::from_utf8_lossy(&bytes);
        let xref = text.find("xref").unwrap();
        for (i, line) in text[xref..].lines().skip(3).take(6).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            let expected = format!("{} 0 obj", i + 1);
            assert!(text[offset..].starts_with(&expected));
        }
    }
}
