use super::*;

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn assert_strips_to(ts: &str, js: &str) {
    let out = strip_types(ts).unwrap();
    assert_eq!(compact(&out), compact(js), "stripped output:\n{out}");
}

#[test]
fn test_strips_parameters_interfaces_and_generic_calls() {
    assert_strips_to(
        r#"
interface Product {
  id: number
  name: string
}

export function up(db: Handle) {
  const products = db.query<Product>(sql`SELECT * FROM products WHERE price > ${15.0}`)
  const widget: Product | null = db.queryOne<Product>(sql`SELECT 1`)
  console.log(`Found ${products.length}`, widget)
}
"#,
        r#"
export function up(db) {
  const products = db.query(sql`SELECT * FROM products WHERE price > ${15.0}`)
  const widget = db.queryOne(sql`SELECT 1`)
  console.log(`Found ${products.length}`, widget)
}
"#,
    );
}

#[test]
fn test_strips_aliases_declarations_casts_and_arrows() {
    assert_strips_to(
        r#"
type Row = { id: number; name?: string }
declare const sql: any
export const down = (db: Handle): void => {
  const rows = db.query(sql`SELECT 1`) as Row[]
  rows.forEach((r: Row) => console.log(r.id!))
}
"#,
        r#"
export const down = (db) => {
  const rows = db.query(sql`SELECT 1`)
  rows.forEach((r) => console.log(r.id))
}
"#,
    );
}

#[test]
fn test_strips_class_annotations() {
    assert_strips_to(
        r#"
class Repo implements Store<Row> {
  private readonly name: string = 'repo'
  count?: number
  constructor(name: string) { this.name = name }
  get(id: number): Row | undefined { return undefined }
}
"#,
        r#"
class Repo {
  name = 'repo'
  count
  constructor(name) { this.name = name }
  get(id) { return undefined }
}
"#,
    );
}

#[test]
fn test_keeps_import_aliases_and_drops_type_imports() {
    assert_strips_to(
        r#"
import type { Handle } from './types'
import { helper as h } from './helper'
export { h as helperAlias }
"#,
        r#"
import { helper as h } from './helper'
export { h as helperAlias }
"#,
    );
}

#[test]
fn test_strips_type_parameters_on_function_declarations() {
    assert_strips_to(
        "function id<T>(x: T): T[] { return [x] }\nfunction pair<K, V extends object>(k: K, v: V): [K, V] { return [k, v] }\n",
        "function id(x) { return [x] }\nfunction pair(k, v) { return [k, v] }\n",
    );
}

#[test]
fn test_strips_generic_arrow_functions() {
    assert_strips_to(
        "const wrap = <T,>(x: T): T => x\nconst both = <A, B>(a: A, b: B) => [a, b]\n",
        "const wrap = (x) => x\nconst both = (a, b) => [a, b]\n",
    );
}

#[test]
fn test_strips_catch_clause_annotations() {
    assert_strips_to(
        "try { run() } catch (e: unknown) { console.log(e) }\ntry { run() } catch (err: any) {}\n",
        "try { run() } catch (e) { console.log(e) }\ntry { run() } catch (err) {}\n",
    );
}

#[test]
fn test_generic_method_in_class() {
    assert_strips_to(
        "class Box { map<U>(f: (v: number) => U): U[] { return [] } }\n",
        "class Box { map(f) { return [] } }\n",
    );
}

#[test]
fn test_plain_javascript_is_unchanged() {
    let js = r#"
const v = flag ? (a) : b
if (a < b && c > (d)) { run({ key: 1 }) }
export default { up(db) { db.exec(sql`SELECT ${a ? 1 : 2}`) }, down: (db) => null }
"#;
    assert_eq!(strip_types(js).unwrap(), js);
}

#[test]
fn test_positions_are_preserved() {
    let ts = "function f(a: number,\n  b: string) { return a }\nlet x = 1";
    let out = strip_types(ts).unwrap();
    assert_eq!(out.len(), ts.len());
    assert_eq!(out.lines().count(), ts.lines().count());
    assert_eq!(out.find("let x"), ts.find("let x"));
}

#[test]
fn test_lex_errors_propagate() {
    assert!(strip_types("const s = 'unterminated\n").is_err());
}
