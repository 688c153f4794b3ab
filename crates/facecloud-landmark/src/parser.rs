use crate::Landmark;

fn parse_vector<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<[f64; 3]> {
    let mut v = [0.0; 3];
    for value in v.iter_mut() {
        *value = tokens.next()?.parse::<f64>().ok().filter(|x| x.is_finite())?;
    }
    if tokens.next().is_some() {
        return None;
    }
    Some(v)
}

/// Parse the standard output of a landmark program.
///
/// The accepted forms are, with any amount of trailing whitespace:
///
/// * `nosetip x y z`
/// * `normal x y z` and `nosetip x y z` on two lines, in any order
/// * `x y z`, a bare nose tip
/// * `x y z` followed by `x y z`, a bare normal followed by the nose tip
///
/// The normal is scaled to unit length, a zero normal is dropped. Anything else returns `None`.
///
/// Example:
///
/// ```
/// use facecloud_landmark::parse_locator_output;
///
/// let landmark = parse_locator_output("normal 0 0 2\nnosetip 1 2 3\n").unwrap();
/// assert_eq!(landmark.position, [1.0, 2.0, 3.0]);
/// assert_eq!(landmark.normal, Some([0.0, 0.0, 1.0]));
/// ```
pub fn parse_locator_output(output: &str) -> Option<Landmark> {
    let lines = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();

    let mut tip = None;
    let mut normal = None;
    let mut bare = Vec::new();

    for line in &lines {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.clone().next() else {
            continue;
        };
        match first {
            "nosetip" => {
                tokens.next();
                if tip.replace(parse_vector(tokens)?).is_some() {
                    return None;
                }
            }
            "normal" => {
                tokens.next();
                if normal.replace(parse_vector(tokens)?).is_some() {
                    return None;
                }
            }
            _ => bare.push(parse_vector(tokens)?),
        }
    }

    // labeled and bare lines are not mixed
    let (tip, normal) = match (tip, normal, bare.as_slice()) {
        (Some(tip), normal, []) => (tip, normal),
        (None, None, [tip]) => (*tip, None),
        (None, None, [normal, tip]) => (*tip, Some(*normal)),
        _ => return None,
    };

    let landmark = Landmark::new(tip);
    Some(match normal {
        Some(n) => landmark.with_normal(n),
        None => landmark,
    })
}
