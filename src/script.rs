//! 호스트 브리지로 보내는 스크립트 (ExtendScript)
//!
//! 모든 스크립트는 자기완결적인 IIFE이며 이전 브리지 상태를 가정하지 않습니다.
//! 반환값 규약: 성공 `"OK"`, 실패 `"ERR:<메시지>"`.
//! 경로/내용 문자열은 JSON 문자열 리터럴로 삽입합니다 (JS에서도 유효한 리터럴).

use crate::transfer::WriteMode;

fn js_string(value: &str) -> String {
    // 문자열 직렬화는 실패하지 않음
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// 경로의 각 세그먼트를 순서대로 만들며 폴더 보장
pub fn ensure_folder(full_path: &str) -> String {
    format!(
        r#"(function() {{
    function ensureFolder(path) {{
        var parts = path.split(/[\\\/]/);
        var acc = parts.shift();
        while (parts.length) {{
            var seg = parts.shift();
            if (!seg) continue;
            acc += "/" + seg;
            var f = new Folder(acc);
            if (!f.exists) {{
                try {{ if (!f.create()) return "ERR:cannot create " + acc; }}
                catch (e) {{ return "ERR:" + e; }}
            }}
        }}
        return "OK";
    }}
    return ensureFolder({path});
}})();"#,
        path = js_string(full_path)
    )
}

/// 텍스트 청크 쓰기 (truncate = "w", append = "a")
pub fn write_text_chunk(target_file: &str, mode: WriteMode, chunk: &str) -> String {
    format!(
        r#"(function() {{
    try {{
        var f = new File({path});
        f.encoding = "UTF-8";
        if (!f.open("{mode}")) return "ERR:cannot open " + f.fsName;
        f.write({chunk});
        f.close();
        return "OK";
    }} catch (e) {{ return "ERR:" + e; }}
}})();"#,
        path = js_string(target_file),
        mode = mode.open_flag(),
        chunk = js_string(chunk)
    )
}

/// 호스트 임시 폴더에 빈 바이너리 파일 생성: 성공 시 전체 경로 반환
pub fn create_temp_binary(file_name: &str) -> String {
    format!(
        r#"(function() {{
    try {{
        var p = Folder.temp.fsName + "/" + {name};
        var f = new File(p);
        f.encoding = "BINARY";
        if (!f.open("w")) return "ERR:cannot open file for writing";
        f.close();
        return p;
    }} catch (e) {{ return "ERR:" + e; }}
}})();"#,
        name = js_string(file_name)
    )
}

/// base64 청크를 디코드하여 바이너리 파일에 이어 쓰기
pub fn append_base64_chunk(target_file: &str, chunk: &str) -> String {
    format!(
        r#"(function() {{
    function b64decode(b64) {{
        var chars = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        var out = "", buffer = 0, bits = 0, c;
        for (var i = 0; i < b64.length; i++) {{
            c = b64.charAt(i);
            if (c === "=") break;
            var idx = chars.indexOf(c);
            if (idx === -1) continue;
            buffer = (buffer << 6) | idx; bits += 6;
            if (bits >= 8) {{ bits -= 8; out += String.fromCharCode((buffer >> bits) & 0xFF); }}
        }}
        return out;
    }}
    try {{
        var f = new File({path});
        f.encoding = "BINARY";
        if (!f.open("a")) return "ERR:cannot open file for append";
        f.write(b64decode({chunk}));
        f.close();
        return "OK";
    }} catch (e) {{ return "ERR:" + e; }}
}})();"#,
        path = js_string(target_file),
        chunk = js_string(chunk)
    )
}

/// 선택된 레이어에 프리셋 적용: `"Success:<개수>"` 또는 `"ERR:..."`
pub fn apply_preset(preset_file: &str) -> String {
    format!(
        r#"(function() {{
    try {{
        var f = new File({path});
        if (!f.exists) return "ERR:file not found";
        var comp = app.project.activeItem;
        if (!comp || !(comp instanceof CompItem)) return "ERR:no active composition";
        var layers = comp.selectedLayers;
        if (layers.length === 0) return "ERR:select at least one layer";
        var applied = 0;
        for (var i = 0; i < layers.length; i++) {{
            layers[i].applyPreset(f);
            applied++;
        }}
        try {{ f.remove(); }} catch (_) {{}}
        return "Success:" + applied;
    }} catch (e) {{ return "ERR:" + e; }}
}})();"#,
        path = js_string(preset_file)
    )
}

/// 패널 재시작 요청 (index.html 재평가 예약)
pub fn restart_panel() -> String {
    r#"(function() {
    try {
        var extPath = new File($.fileName).parent.fsName;
        var indexFile = new File(extPath + "/index.html");
        if (indexFile.exists) {
            app.scheduleTask("$.evalFile('" + indexFile.fsName + "')", 0, false);
        }
        return "OK";
    } catch (e) { return "ERR:" + e; }
})();"#
        .to_string()
}
