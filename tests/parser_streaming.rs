#![allow(missing_docs)]

use bytes::Bytes;
use futures::{TryStream, channel::mpsc, stream};
use streaming_multipart::{BoxError, MultipartError, MultipartReader, PartReader};

type ChunkStream = stream::Iter<std::vec::IntoIter<Result<Bytes, std::io::Error>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Collected {
    headers: Vec<(String, String)>,
    file_name: Option<String>,
    form_name: Option<String>,
    body: Vec<u8>,
}

const TWO_FIELDS_AND_FILE: &str = concat!(
    "--AaB03x\r\n",
    "Content-Disposition: form-data; name=\"foo\"\r\n",
    "\r\n",
    "bar\r\n",
    "--AaB03x\r\n",
    "Content-Disposition: form-data; name=\"multi\"\r\n",
    "\r\n",
    "one\r\n",
    "--AaB03x\r\n",
    "Content-Disposition: form-data; name=\"multi\"\r\n",
    "\r\n",
    "two\r\n",
    "--AaB03x\r\n",
    "Content-Disposition: form-data; name=\"cool\"; filename=\"cool.bin\"\r\n",
    "Content-Type: application/octet-stream\r\n",
    "\r\n",
    "line one\r\n--AaB03xx not a boundary\r\n\r\n-- almost\r\n",
    "--AaB03x--\r\n"
);

#[tokio::test]
async fn single_field_body_yields_one_part() {
    let body = concat!(
        "--myboundary\r\n",
        "Content-Disposition: form-data; name=\"foo\"\r\n",
        "\r\n",
        "bar\r\n",
        "--myboundary--\r\n"
    );

    let parts = collect_parts("myboundary", body.as_bytes(), &[body.len()])
        .await
        .expect("body should parse");

    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].form_name.as_deref(), Some("foo"));
    assert!(parts[0].file_name.is_none());
    assert_eq!(parts[0].body, b"bar");
}

#[tokio::test]
async fn fields_and_file_are_yielded_in_wire_order() {
    let input = TWO_FIELDS_AND_FILE.as_bytes();
    let parts = collect_parts("AaB03x", input, &[input.len()])
        .await
        .expect("body should parse");

    let names: Vec<_> = parts.iter().map(|part| part.form_name.as_deref()).collect();
    assert_eq!(names, vec![Some("foo"), Some("multi"), Some("multi"), Some("cool")]);
    assert_eq!(parts[0].body, b"bar");
    assert_eq!(parts[1].body, b"one");
    assert_eq!(parts[2].body, b"two");

    let file = &parts[3];
    assert_eq!(file.file_name.as_deref(), Some("cool.bin"));
    assert_eq!(
        file.body,
        b"line one\r\n--AaB03xx not a boundary\r\n\r\n-- almost".to_vec()
    );
    assert_eq!(
        file.headers,
        vec![
            (
                "content-disposition".to_owned(),
                "form-data; name=\"cool\"; filename=\"cool.bin\"".to_owned()
            ),
            ("content-type".to_owned(), "application/octet-stream".to_owned()),
        ]
    );
}

#[tokio::test]
async fn parts_do_not_depend_on_chunk_sizes() {
    let input = TWO_FIELDS_AND_FILE.as_bytes();
    let expected = collect_parts("AaB03x", input, &[input.len()])
        .await
        .expect("body should parse");

    for size in 1..=17 {
        let actual = collect_parts("AaB03x", input, &vec![size; input.len()])
            .await
            .expect("body should parse");
        assert_eq!(actual, expected, "chunk size {size}");
    }

    let uneven = [3, 2, 7, 1, 4, 9, 5, 8, 6, 64, 1, 1, 2];
    let actual = collect_parts("AaB03x", input, &uneven)
        .await
        .expect("body should parse");
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn bodies_concatenate_to_input_without_framing() {
    let mut input = Vec::new();
    let mut expected = Vec::new();
    for (index, payload) in [&b"alpha"[..], b"", b"\r\n\r\n--", b"\r\n--BOUNDARYish", b"z"]
        .iter()
        .enumerate()
    {
        input.extend_from_slice(b"--BOUNDARY\r\n");
        input.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"f{index}\"\r\n\r\n").as_bytes(),
        );
        input.extend_from_slice(payload);
        input.extend_from_slice(b"\r\n");
        expected.extend_from_slice(payload);
    }
    input.extend_from_slice(b"--BOUNDARY--\r\n");

    for size in [1, 2, 5, 11, input.len()] {
        let parts = collect_parts("BOUNDARY", &input, &vec![size; input.len()])
            .await
            .expect("body should parse");
        let joined: Vec<u8> = parts.into_iter().flat_map(|part| part.body).collect();
        assert_eq!(joined, expected, "chunk size {size}");
    }
}

#[tokio::test]
async fn skips_preamble_and_epilogue() {
    let body = concat!(
        "This is the preamble.\r\n",
        "--B is not the boundary line\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"a\"\r\n",
        "\r\n",
        "1\r\n",
        "--B--\r\n",
        "epilogue is never read"
    );

    let parts = collect_parts("B", body.as_bytes(), &[5])
        .await
        .expect("body should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].body, b"1");
}

#[tokio::test]
async fn accepts_trailing_whitespace_on_boundary_lines() {
    let body = concat!(
        "--B \t\r\n",
        "Content-Disposition: form-data; name=\"a\"\r\n",
        "\r\n",
        "1\r\n",
        "--B--  "
    );

    let parts = collect_parts("B", body.as_bytes(), &[body.len()])
        .await
        .expect("body should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].body, b"1");
}

#[tokio::test]
async fn accepts_lf_only_bodies() {
    let body = concat!(
        "--B\n",
        "Content-Disposition: form-data; name=\"a\"\n",
        "\n",
        "one\r\n",
        "--B\n",
        "Content-Disposition: form-data; name=\"b\"\n",
        "\n",
        "two\n",
        "--B--\n"
    );

    let parts = collect_parts("B", body.as_bytes(), &[2])
        .await
        .expect("body should parse");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].body, b"one\r");
    assert_eq!(parts[1].body, b"two");
}

#[tokio::test]
async fn empty_body_with_only_final_boundary_has_no_parts() {
    let parts = collect_parts("B", b"--B--\r\n", &[7])
        .await
        .expect("body should parse");
    assert!(parts.is_empty());
}

#[tokio::test]
async fn yields_first_part_before_input_completes() {
    let first_chunk = concat!(
        "--B\r\n",
        "Content-Disposition: form-data; name=\"first\"\r\n",
        "\r\n",
        "one\r\n",
        "--B\r\n",
        "Content-Disposition: form-data; name=\"second\"\r\n",
        "\r\n"
    );
    let second_chunk = concat!("two\r\n", "--B--\r\n");

    let (tx, rx) = mpsc::unbounded::<Result<Bytes, std::io::Error>>();
    let mut multipart = MultipartReader::new("B", rx).expect("boundary should be valid");

    tx.unbounded_send(Ok(Bytes::from_static(first_chunk.as_bytes())))
        .expect("send first chunk");

    {
        let mut first = multipart
            .next()
            .await
            .expect("first part should parse")
            .expect("first part expected");
        assert_eq!(first.form_name(), Some("first"));
        assert_eq!(read_body(&mut first).await.expect("body"), b"one");
    }

    tx.unbounded_send(Ok(Bytes::from_static(second_chunk.as_bytes())))
        .expect("send second chunk");
    drop(tx);

    let mut second = multipart
        .next()
        .await
        .expect("second part should parse")
        .expect("second part expected");
    assert_eq!(second.form_name(), Some("second"));
    assert_eq!(read_body(&mut second).await.expect("body"), b"two");
    drop(second);

    assert!(multipart.next().await.expect("end").is_none());
}

#[tokio::test]
async fn reports_missing_final_boundary() {
    let body = concat!(
        "--BOUND\r\n",
        "Content-Disposition: form-data; name=\"field\"\r\n",
        "\r\n",
        "hello"
    );

    let err = collect_parts("BOUND", body.as_bytes(), &[4])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::UnexpectedEndOfStream));
}

#[tokio::test]
async fn reports_input_without_any_boundary() {
    let err = collect_parts("BOUND", b"just some text\r\n", &[3])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::UnexpectedEndOfStream));
}

#[tokio::test]
async fn reports_wrong_boundary_after_part() {
    let body = concat!(
        "--BOUND\r\n",
        "Content-Disposition: form-data; name=\"field\"\r\n",
        "\r\n",
        "hello\r\n",
        "--WRONG--\r\n"
    );

    let err = collect_parts("BOUND", body.as_bytes(), &[body.len()])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::UnexpectedEndOfStream));
}

#[tokio::test]
async fn reports_garbage_between_parts() {
    let body = concat!(
        "--BOUND\r\n",
        "Content-Disposition: form-data; name=\"field\"\r\n",
        "\r\n",
        "hello\r\n",
        "--BOUND  x\r\n",
        "--BOUND--\r\n"
    );

    let err = collect_parts("BOUND", body.as_bytes(), &[body.len()])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::ProtocolSequence { .. }));
}

#[tokio::test]
async fn reports_invalid_headers() {
    let body = concat!(
        "--BOUND\r\n",
        "Content-Disposition form-data; name=\"field\"\r\n",
        "\r\n",
        "hello\r\n",
        "--BOUND--\r\n"
    );

    let err = collect_parts("BOUND", body.as_bytes(), &[body.len()])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::MalformedHeaderLine { .. }));
}

#[tokio::test]
async fn errors_are_terminal() {
    let body = concat!(
        "--BOUND\r\n",
        " Content-Disposition: form-data; name=\"field\"\r\n",
        "\r\n",
        "hello\r\n",
        "--BOUND--\r\n"
    );
    let mut multipart =
        MultipartReader::new("BOUND", chunked(body.as_bytes(), &[body.len()])).expect("boundary");

    let err = multipart.next_part().await.expect_err("must fail");
    assert!(matches!(err, MultipartError::MalformedHeaderBlock { .. }));
    assert!(multipart.is_finished());
    assert!(multipart.next_part().await.expect("no more parts").is_none());
}

#[tokio::test]
async fn surfaces_source_errors() {
    let chunks = vec![
        Ok(Bytes::from_static(b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nab")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ];
    let mut multipart = MultipartReader::new("B", stream::iter(chunks)).expect("boundary");

    let mut part = multipart
        .next()
        .await
        .expect("part should parse")
        .expect("part expected");
    let err = read_body(&mut part).await.expect_err("must fail");
    assert!(matches!(err, MultipartError::Source(_)));
}

#[tokio::test]
async fn reads_from_async_reader() {
    let body = concat!(
        "--R\r\n",
        "Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n",
        "\r\n",
        "from a reader\r\n",
        "--R--\r\n"
    );
    let mut multipart =
        MultipartReader::from_reader("R", body.as_bytes()).expect("boundary should be valid");

    let mut part = multipart
        .next()
        .await
        .expect("part should parse")
        .expect("part expected");
    assert_eq!(part.file_name(), Some("a.txt"));
    assert_eq!(read_body(&mut part).await.expect("body"), b"from a reader");
}

#[tokio::test]
async fn reports_input_cut_inside_closing_boundary() {
    for tail in ["--BOUND", "--BOUND-", "--BOU"] {
        let body = format!(
            "--BOUND\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n{tail}"
        );

        let err = collect_parts("BOUND", body.as_bytes(), &[3])
            .await
            .expect_err("must fail");
        assert!(
            matches!(err, MultipartError::UnexpectedEndOfStream),
            "tail {tail:?}: {err:?}"
        );
    }
}

#[tokio::test]
async fn reports_preamble_without_terminator() {
    let err = collect_parts("BOUND", b"preamble only, no newline", &[4])
        .await
        .expect_err("must fail");
    assert!(matches!(err, MultipartError::UnexpectedEndOfStream));
}

#[tokio::test]
async fn lf_body_may_end_with_crlf_final_boundary() {
    let body = concat!(
        "--B\n",
        "Content-Disposition: form-data; name=\"a\"\n",
        "\n",
        "one\n",
        "--B--\r\n"
    );

    let parts = collect_parts("B", body.as_bytes(), &[3])
        .await
        .expect("body should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].body, b"one");
}

#[tokio::test]
async fn near_miss_delimiters_with_longest_boundary_stay_in_body() {
    let boundary = "b".repeat(70);
    let mut payload = Vec::new();
    for _ in 0..50 {
        payload.extend_from_slice(format!("\r\n--{}", &boundary[..69]).as_bytes());
        payload.extend_from_slice(format!("\r\n--{boundary}y").as_bytes());
        payload.extend_from_slice(b"\r\r\n-");
    }
    let mut input = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\n"
    )
    .into_bytes();
    input.extend_from_slice(&payload);
    input.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let parts = collect_parts(&boundary, &input, &vec![1; input.len()])
        .await
        .expect("body should parse");
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].body, payload);
}

async fn collect_parts(
    boundary: &str,
    input: &[u8],
    chunk_sizes: &[usize],
) -> Result<Vec<Collected>, MultipartError> {
    let mut multipart = MultipartReader::new(boundary, chunked(input, chunk_sizes))?;
    let mut parts = Vec::new();

    while let Some(mut part) = multipart.next().await? {
        let headers = part
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = read_body(&mut part).await?;
        parts.push(Collected {
            headers,
            file_name: part.file_name().map(str::to_owned),
            form_name: part.form_name().map(str::to_owned),
            body,
        });
    }

    Ok(parts)
}

async fn read_body<S>(part: &mut PartReader<'_, S>) -> Result<Vec<u8>, MultipartError>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: Into<BoxError>,
{
    let mut body = Vec::new();
    let mut buf = [0u8; 7];
    while let Some(n) = part.read(&mut buf).await? {
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}

fn chunked(input: &[u8], chunk_sizes: &[usize]) -> ChunkStream {
    let chunks: Vec<Result<Bytes, std::io::Error>> = split_bytes(input, chunk_sizes)
        .into_iter()
        .map(Ok)
        .collect();
    stream::iter(chunks)
}

fn split_bytes(input: &[u8], chunk_sizes: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut index = 0usize;

    for &size in chunk_sizes {
        if index >= input.len() {
            break;
        }
        let end = (index + size).min(input.len());
        chunks.push(Bytes::copy_from_slice(&input[index..end]));
        index = end;
    }

    if index < input.len() {
        chunks.push(Bytes::copy_from_slice(&input[index..]));
    }

    chunks
}
