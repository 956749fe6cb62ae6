//! Argument types that need custom parsing.

use std::path::PathBuf;

use innervation_pipeline::Point;

/// Polygon vertices given as `"x,y x,y x,y ..."`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiArg(pub Vec<Point>);

/// Parse `--roi`. Vertices are separated by whitespace or `;`.
pub fn parse_roi(s: &str) -> Result<RoiArg, String> {
    let vertices = s
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|t| !t.is_empty())
        .map(parse_vertex)
        .collect::<Result<Vec<_>, _>>()?;
    if vertices.len() < 3 {
        return Err(format!(
            "ROI needs at least 3 vertices, got {}",
            vertices.len()
        ));
    }
    Ok(RoiArg(vertices))
}

fn parse_vertex(token: &str) -> Result<Point, String> {
    let (x, y) = token
        .split_once(',')
        .ok_or_else(|| format!("vertex {token:?} is not of the form x,y"))?;
    let coord = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|c| c.is_finite())
            .ok_or_else(|| format!("invalid coordinate {v:?} in vertex {token:?}"))
    };
    Ok(Point::new(coord(x)?, coord(y)?))
}

/// A named group of results files, one per animal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupArg {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Parse `--group NAME=FILE[,FILE...]`.
pub fn parse_group(s: &str) -> Result<GroupArg, String> {
    let (name, files) = s
        .split_once('=')
        .ok_or_else(|| format!("group {s:?} is not of the form NAME=FILE[,FILE...]"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("group {s:?} has no name"));
    }
    let files: Vec<PathBuf> = files
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect();
    if files.is_empty() {
        return Err(format!("group {name:?} lists no files"));
    }
    Ok(GroupArg {
        name: name.to_owned(),
        files,
    })
}
