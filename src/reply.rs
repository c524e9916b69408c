use uuid::Uuid;

/// Builds the multipart/form-data success reply: the sample photo plus the
/// recovered car JSON, framed RFC 2046-style with CRLF line endings.
#[derive(Debug)]
pub struct MultipartReply {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartReply {
    pub fn new() -> Self {
        Self {
            boundary: format!("carlens-{}", Uuid::new_v4().simple()),
            body: Vec::new(),
        }
    }

    /// A file part with a filename, e.g. the bundled photo.
    pub fn file_part(&mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) {
        self.push_headers(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}",
            name, filename, content_type
        ));
        self.push_data(data);
    }

    /// A plain field part, e.g. the car_info JSON.
    pub fn part(&mut self, name: &str, content_type: &str, data: &[u8]) {
        self.push_headers(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\nContent-Type: {}",
            name, content_type
        ));
        self.push_data(data);
    }

    /// Close the body and hand back the Content-Type header value plus the
    /// finished bytes.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        let content_type = format!("multipart/form-data; boundary={}", self.boundary);
        (content_type, self.body)
    }

    fn push_headers(&mut self, headers: &str) {
        self.body
            .extend_from_slice(format!("--{}\r\n{}\r\n\r\n", self.boundary, headers).as_bytes());
    }

    fn push_data(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_part_reply_framing() {
        let mut reply = MultipartReply::new();
        reply.file_part("photo", "sample_photo.jpg", "image/jpeg", b"JPEGDATA");
        reply.part("car_info", "application/json", b"{\n  \"ok\": true\n}");
        let (content_type, body) = reply.finish();

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("content type carries the boundary");
        let text = String::from_utf8(body).unwrap();

        assert!(text.contains(&format!("--{}\r\n", boundary)));
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"photo\"; filename=\"sample_photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n"
        ));
        assert!(text.contains(
            "Content-Disposition: form-data; name=\"car_info\"\r\nContent-Type: application/json\r\n\r\n{\n  \"ok\": true\n}\r\n"
        ));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn test_boundary_is_unique_per_reply() {
        let (a, _) = MultipartReply::new().finish();
        let (b, _) = MultipartReply::new().finish();
        assert_ne!(a, b);
    }
}
